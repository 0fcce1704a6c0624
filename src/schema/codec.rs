use std::fmt;

/// Per-property value codec between application strings and directory
/// strings. The default is an identity passthrough; case-folding variants
/// cover attributes whose server-side matching rule folds case.
#[derive(Clone)]
pub enum ValueCodec {
    Identity,
    Lowercase,
    Uppercase,
    Custom {
        name: &'static str,
        /// app value -> directory string
        encode: fn(&str) -> String,
        /// directory string -> app value
        decode: fn(&str) -> String,
    },
}

impl ValueCodec {
    pub fn name(&self) -> &str {
        match self {
            ValueCodec::Identity => "string",
            ValueCodec::Lowercase => "string_lowercase",
            ValueCodec::Uppercase => "string_uppercase",
            ValueCodec::Custom { name, .. } => name,
        }
    }

    pub fn encode(&self, value: &str) -> String {
        match self {
            ValueCodec::Identity => value.to_string(),
            ValueCodec::Lowercase => value.to_lowercase(),
            ValueCodec::Uppercase => value.to_uppercase(),
            ValueCodec::Custom { encode, .. } => encode(value),
        }
    }

    pub fn decode(&self, value: &str) -> String {
        match self {
            ValueCodec::Identity => value.to_string(),
            ValueCodec::Lowercase => value.to_lowercase(),
            ValueCodec::Uppercase => value.to_uppercase(),
            ValueCodec::Custom { decode, .. } => decode(value),
        }
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        ValueCodec::Identity
    }
}

impl fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
