//! Positional argument decoding.
//!
//! Every action declares its arguments as a tuple. [`FromArgs`] checks the
//! argument count against the tuple arity, then decodes each position into
//! its element type.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors from decoding positional arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentDecodeError {
    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index}: expected {expected_type}: {reason}")]
    Type {
        index: usize,
        expected_type: String,
        reason: String,
    },
}

/// Decodes an ordered argument list into a typed tuple.
pub trait FromArgs: Sized {
    /// Exact number of arguments accepted.
    const ARITY: usize;

    fn from_args(args: Vec<Value>) -> Result<Self, ArgumentDecodeError>;
}

fn check_arity(expected: usize, actual: usize) -> Result<(), ArgumentDecodeError> {
    if expected != actual {
        return Err(ArgumentDecodeError::Arity { expected, actual });
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(index: usize, value: Value) -> Result<T, ArgumentDecodeError> {
    serde_json::from_value(value).map_err(|e| ArgumentDecodeError::Type {
        index,
        expected_type: short_type_name::<T>(),
        reason: e.to_string(),
    })
}

/// Type name with module paths stripped, e.g. `Option<Vec<DiskCid>>`.
fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let mut short = String::with_capacity(full.len());
    let mut start = 0;
    for (i, c) in full.char_indices() {
        if !(c.is_alphanumeric() || c == '_' || c == ':') {
            short.push_str(last_segment(&full[start..i]));
            short.push(c);
            start = i + c.len_utf8();
        }
    }
    short.push_str(last_segment(&full[start..]));
    short
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

impl FromArgs for () {
    const ARITY: usize = 0;

    fn from_args(args: Vec<Value>) -> Result<Self, ArgumentDecodeError> {
        check_arity(Self::ARITY, args.len())
    }
}

macro_rules! impl_from_args {
    ($arity:literal; $($index:tt => $ty:ident),+) => {
        impl<$($ty),+> FromArgs for ($($ty,)+)
        where
            $($ty: DeserializeOwned,)+
        {
            const ARITY: usize = $arity;

            fn from_args(args: Vec<Value>) -> Result<Self, ArgumentDecodeError> {
                check_arity(Self::ARITY, args.len())?;
                let mut args = args.into_iter();
                Ok(($(decode::<$ty>($index, args.next().unwrap_or(Value::Null))?,)+))
            }
        }
    };
}

impl_from_args!(1; 0 => A);
impl_from_args!(2; 0 => A, 1 => B);
impl_from_args!(3; 0 => A, 1 => B, 2 => C);
impl_from_args!(4; 0 => A, 1 => B, 2 => C, 3 => D);
impl_from_args!(5; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_from_args!(6; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_accepts_only_empty() {
        assert!(<()>::from_args(vec![]).is_ok());
        assert_eq!(
            <()>::from_args(vec![json!(1)]),
            Err(ArgumentDecodeError::Arity {
                expected: 0,
                actual: 1
            })
        );
    }

    #[test]
    fn test_decodes_positions_in_order() {
        let (path, props, size): (String, serde_json::Map<String, Value>, u64) =
            FromArgs::from_args(vec![json!("/tmp/image.tgz"), json!({"a": 1}), json!(42)])
                .unwrap();
        assert_eq!(path, "/tmp/image.tgz");
        assert_eq!(props["a"], 1);
        assert_eq!(size, 42);
    }

    #[test]
    fn test_reports_failing_index_and_type() {
        let err = <(String, u64)>::from_args(vec![json!("ok"), json!("not a number")])
            .unwrap_err();
        match err {
            ArgumentDecodeError::Type {
                index,
                expected_type,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected_type, "u64");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_type_names_omit_module_paths() {
        assert_eq!(short_type_name::<u64>(), "u64");
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(
            short_type_name::<Option<Vec<warden_cpi_id::DiskCid>>>(),
            "Option<Vec<DiskCid>>"
        );
        assert_eq!(
            short_type_name::<serde_json::Map<String, Value>>(),
            "Map<String, Value>"
        );

        let err = <(Vec<warden_cpi_id::DiskCid>,)>::from_args(vec![json!("disk-1")]).unwrap_err();
        assert!(err.to_string().starts_with("argument 0: expected Vec<DiskCid>: "));
        assert!(!err.to_string().contains("::"));
    }

    #[test]
    fn test_null_decodes_into_option() {
        let (value,): (Option<String>,) = FromArgs::from_args(vec![Value::Null]).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_too_many_arguments() {
        let err = <(String,)>::from_args(vec![json!("a"), json!("b")]).unwrap_err();
        assert_eq!(
            err,
            ArgumentDecodeError::Arity {
                expected: 1,
                actual: 2
            }
        );
    }
}
