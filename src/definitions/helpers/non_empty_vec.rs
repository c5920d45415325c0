use std::ops::{Deref, DerefMut};

use ciborium::Value;
use coset::AsCborValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyVec<T>(Vec<T>);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected a non-empty array")]
    Empty,
}

impl<T> NonEmptyVec<T> {
    pub fn new(t: T) -> Self {
        Self(vec![t])
    }

    pub fn maybe_new(v: Vec<T>) -> Option<Self> {
        Self::try_from(v).ok()
    }

    pub fn push(&mut self, t: T) {
        self.0.push(t)
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> TryFrom<Vec<T>> for NonEmptyVec<T> {
    type Error = Error;

    fn try_from(v: Vec<T>) -> Result<NonEmptyVec<T>, Error> {
        if v.is_empty() {
            return Err(Error::Empty);
        }
        Ok(NonEmptyVec(v))
    }
}

impl<T> From<NonEmptyVec<T>> for Vec<T> {
    fn from(NonEmptyVec(v): NonEmptyVec<T>) -> Vec<T> {
        v
    }
}

impl<T> AsRef<[T]> for NonEmptyVec<T> {
    fn as_ref(&self) -> &[T] {
        &self.0
    }
}

impl<T> Deref for NonEmptyVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T> DerefMut for NonEmptyVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.0
    }
}

impl<T: AsCborValue> coset::CborSerializable for NonEmptyVec<T> {}
impl<T: AsCborValue> AsCborValue for NonEmptyVec<T> {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        let v = match value {
            Value::Array(v) => v,
            _ => {
                return Err(coset::CoseError::DecodeFailed(
                    ciborium::de::Error::Semantic(None, "not an array".to_string()),
                ))
            }
        };
        NonEmptyVec::try_from(
            v.into_iter()
                .map(T::from_cbor_value)
                .collect::<coset::Result<Vec<T>>>()?,
        )
        .map_err(|_| {
            coset::CoseError::DecodeFailed(ciborium::de::Error::Semantic(
                None,
                "empty array".to_string(),
            ))
        })
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(Value::Array(
            self.into_inner()
                .into_iter()
                .map(AsCborValue::to_cbor_value)
                .collect::<coset::Result<Vec<Value>>>()?,
        ))
    }
}
