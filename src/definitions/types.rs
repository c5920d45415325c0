//! Validated newtypes for the identifiers that thread through the mdoc data
//! model. Construction checks the invariant once; the wrappers are immutable
//! afterwards.

use std::fmt;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected a non-empty string")]
    EmptyString,
    #[error("digest id must be a non-negative integer")]
    InvalidDigestId,
    #[error("expected non-empty random bytes")]
    EmptyRandom,
}

macro_rules! non_empty_string {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: Into<String>>(s: S) -> Result<Self> {
                let s = s.into();
                if s.is_empty() {
                    return Err(Error::EmptyString);
                }
                Ok(Self(s))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$name> for String {
            fn from($name(s): $name) -> String {
                s
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

non_empty_string!(DocType);
non_empty_string!(NameSpace);
non_empty_string!(ElementIdentifier);

/// Position of an item's digest in the MSO digest list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DigestId(u64);

impl DigestId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DigestId {
    fn from(i: u64) -> DigestId {
        DigestId(i)
    }
}

impl TryFrom<i128> for DigestId {
    type Error = Error;

    fn try_from(i: i128) -> Result<DigestId> {
        u64::try_from(i).map(DigestId).map_err(|_| Error::InvalidDigestId)
    }
}

/// Per-item salt preventing digest correlation across presentations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Random(Vec<u8>);

impl Random {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::EmptyRandom);
        }
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Random {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Random> for Vec<u8> {
    fn from(Random(bytes): Random) -> Vec<u8> {
        bytes
    }
}
