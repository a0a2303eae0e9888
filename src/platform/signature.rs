//! WinRT type signatures and parameterized interface identity
//!
//! Generic platform delegates such as `AsyncOperationCompletedHandler<T>` have
//! no fixed IID. The concrete identity is derived from the generic base IID
//! and the signature string of each type argument, hashed into a version 5
//! UUID under the `pinterface` namespace.

use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Interface identifier
pub type Guid = Uuid;

/// `Windows.Foundation.AsyncOperationCompletedHandler<TResult>`
pub const ASYNC_OPERATION_COMPLETED_HANDLER: Guid =
    Uuid::from_u128(0xfcdcf02c_e5d8_4478_915a_4d90b74b83a5);

/// `Windows.Foundation.AsyncActionCompletedHandler`
pub const ASYNC_ACTION_COMPLETED_HANDLER: Guid =
    Uuid::from_u128(0xa4ed5c81_76c9_40bd_8be6_b1d90fb20ae7);

/// Namespace all parameterized instance IIDs are hashed under
pub const PINTERFACE_NAMESPACE: Guid = Uuid::from_u128(0x11f47ad5_7b73_42c0_abae_878b1e16adee);

/// Signature of a WinRT type used as a generic argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    Boolean,
    Char16,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    Guid,
    Object,
    Interface(Guid),
    Delegate(Guid),
    RuntimeClass {
        name: std::string::String,
        default_interface: Box<TypeSignature>,
    },
    Enum {
        name: std::string::String,
        flags: bool,
    },
    Struct {
        name: std::string::String,
        fields: Vec<TypeSignature>,
    },
    Parameterized {
        base: Guid,
        args: Vec<TypeSignature>,
    },
    /// Pre-rendered signature string, validated before use
    Raw(std::string::String),
}

impl TypeSignature {
    /// Wrap an already rendered signature string after a structural check
    pub fn parse_raw(signature: &str) -> Result<Self> {
        validate_raw(signature)?;
        Ok(TypeSignature::Raw(signature.to_string()))
    }

    pub fn runtime_class(name: &str, default_interface: TypeSignature) -> Self {
        TypeSignature::RuntimeClass {
            name: name.to_string(),
            default_interface: Box::new(default_interface),
        }
    }

    /// Check the signature can be rendered into a well-formed identity string
    pub fn validate(&self) -> Result<()> {
        match self {
            TypeSignature::RuntimeClass {
                name,
                default_interface,
            } => {
                validate_name(name)?;
                default_interface.validate()
            }
            TypeSignature::Enum { name, .. } => validate_name(name),
            TypeSignature::Struct { name, fields } => {
                validate_name(name)?;
                if fields.is_empty() {
                    return Err(Error::IdentityResolution(format!(
                        "struct {} has no fields",
                        name
                    )));
                }
                fields.iter().try_for_each(TypeSignature::validate)
            }
            TypeSignature::Parameterized { args, .. } => {
                if args.is_empty() {
                    return Err(Error::IdentityResolution(
                        "parameterized type needs at least one argument".to_string(),
                    ));
                }
                args.iter().try_for_each(TypeSignature::validate)
            }
            TypeSignature::Raw(raw) => validate_raw(raw),
            _ => Ok(()),
        }
    }

    /// Interface identity of this type, when it has one
    pub fn iid(&self) -> Result<Guid> {
        match self {
            TypeSignature::Interface(guid) | TypeSignature::Delegate(guid) => Ok(*guid),
            TypeSignature::Parameterized { base, args } => parameterized_instance_guid(*base, args),
            TypeSignature::RuntimeClass {
                default_interface, ..
            } => default_interface.iid(),
            other => Err(Error::IdentityResolution(format!(
                "{} does not name an interface",
                other
            ))),
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Boolean => f.write_str("b1"),
            TypeSignature::Char16 => f.write_str("c2"),
            TypeSignature::UInt8 => f.write_str("u1"),
            TypeSignature::Int16 => f.write_str("i2"),
            TypeSignature::UInt16 => f.write_str("u2"),
            TypeSignature::Int32 => f.write_str("i4"),
            TypeSignature::UInt32 => f.write_str("u4"),
            TypeSignature::Int64 => f.write_str("i8"),
            TypeSignature::UInt64 => f.write_str("u8"),
            TypeSignature::Float32 => f.write_str("f4"),
            TypeSignature::Float64 => f.write_str("f8"),
            TypeSignature::String => f.write_str("string"),
            TypeSignature::Guid => f.write_str("g16"),
            TypeSignature::Object => f.write_str("cinterface(IInspectable)"),
            TypeSignature::Interface(guid) => write!(f, "{{{}}}", guid),
            TypeSignature::Delegate(guid) => write!(f, "delegate({{{}}})", guid),
            TypeSignature::RuntimeClass {
                name,
                default_interface,
            } => write!(f, "rc({};{})", name, default_interface),
            TypeSignature::Enum { name, flags } => {
                write!(f, "enum({};{})", name, if *flags { "u4" } else { "i4" })
            }
            TypeSignature::Struct { name, fields } => {
                write!(f, "struct({}", name)?;
                for field in fields {
                    write!(f, ";{}", field)?;
                }
                f.write_str(")")
            }
            TypeSignature::Parameterized { base, args } => {
                write!(f, "pinterface({{{}}}", base)?;
                for arg in args {
                    write!(f, ";{}", arg)?;
                }
                f.write_str(")")
            }
            TypeSignature::Raw(raw) => f.write_str(raw),
        }
    }
}

/// Compute the IID of `base` instantiated with `args`.
///
/// Pure: the same inputs always produce the same identity.
pub fn parameterized_instance_guid(base: Guid, args: &[TypeSignature]) -> Result<Guid> {
    let signature = TypeSignature::Parameterized {
        base,
        args: args.to_vec(),
    };
    signature.validate()?;

    let rendered = signature.to_string();
    tracing::trace!(signature = %rendered, "resolving parameterized interface identity");
    Ok(Uuid::new_v5(&PINTERFACE_NAMESPACE, rendered.as_bytes()))
}

/// IID of `AsyncOperationCompletedHandler<result>`
pub fn completed_handler_iid(result: &TypeSignature) -> Result<Guid> {
    parameterized_instance_guid(
        ASYNC_OPERATION_COMPLETED_HANDLER,
        std::slice::from_ref(result),
    )
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([';', '(', ')', '{', '}']) {
        return Err(Error::IdentityResolution(format!(
            "invalid type name: {:?}",
            name
        )));
    }
    Ok(())
}

fn validate_raw(signature: &str) -> Result<()> {
    if signature.is_empty() {
        return Err(Error::IdentityResolution("empty type signature".to_string()));
    }
    if !signature.chars().all(|c| c.is_ascii_graphic()) {
        return Err(Error::IdentityResolution(format!(
            "type signature contains non-printable characters: {:?}",
            signature
        )));
    }

    let mut stack = Vec::new();
    for c in signature.chars() {
        match c {
            '(' | '{' => stack.push(c),
            ')' if stack.pop() != Some('(') => {
                return Err(unbalanced(signature));
            }
            '}' if stack.pop() != Some('{') => {
                return Err(unbalanced(signature));
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(unbalanced(signature));
    }
    Ok(())
}

fn unbalanced(signature: &str) -> Error {
    Error::IdentityResolution(format!("unbalanced type signature: {}", signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IBLUETOOTH_ADAPTER: Guid = Uuid::from_u128(0x7974f04c_5f7a_4a34_9225_a855f84b1a8b);

    #[test]
    fn test_bool_completed_handler_iid() {
        let iid = completed_handler_iid(&TypeSignature::Boolean).unwrap();
        assert_eq!(
            iid,
            Uuid::from_u128(0xc1d3d1a2_ae17_5a5f_b5a2_bdcc8844889a)
        );
    }

    #[test]
    fn test_string_completed_handler_iid() {
        let iid = completed_handler_iid(&TypeSignature::String).unwrap();
        assert_eq!(
            iid,
            Uuid::from_u128(0xb79a741f_7fb5_50ae_9e99_911201ec3d41)
        );
    }

    #[test]
    fn test_raw_matches_structured() {
        let raw = TypeSignature::parse_raw("b1").unwrap();
        assert_eq!(
            completed_handler_iid(&raw).unwrap(),
            completed_handler_iid(&TypeSignature::Boolean).unwrap()
        );
    }

    #[test]
    fn test_identity_is_version_5() {
        let class = TypeSignature::runtime_class(
            "Windows.Devices.Bluetooth.BluetoothAdapter",
            TypeSignature::Interface(IBLUETOOTH_ADAPTER),
        );
        let iid = completed_handler_iid(&class).unwrap();
        assert_eq!(iid.get_version_num(), 5);
        assert_ne!(iid, completed_handler_iid(&TypeSignature::Boolean).unwrap());
    }

    #[test]
    fn test_rendering() {
        let class = TypeSignature::runtime_class(
            "Windows.Devices.Bluetooth.BluetoothAdapter",
            TypeSignature::Interface(IBLUETOOTH_ADAPTER),
        );
        assert_eq!(
            class.to_string(),
            "rc(Windows.Devices.Bluetooth.BluetoothAdapter;{7974f04c-5f7a-4a34-9225-a855f84b1a8b})"
        );

        let status = TypeSignature::Enum {
            name: "Windows.Devices.Bluetooth.BluetoothError".to_string(),
            flags: false,
        };
        assert_eq!(
            status.to_string(),
            "enum(Windows.Devices.Bluetooth.BluetoothError;i4)"
        );

        let nested = TypeSignature::Parameterized {
            base: ASYNC_OPERATION_COMPLETED_HANDLER,
            args: vec![TypeSignature::UInt64],
        };
        assert_eq!(
            nested.to_string(),
            "pinterface({fcdcf02c-e5d8-4478-915a-4d90b74b83a5};u8)"
        );
    }

    #[test]
    fn test_empty_args_rejected() {
        let err = parameterized_instance_guid(ASYNC_OPERATION_COMPLETED_HANDLER, &[]).unwrap_err();
        assert!(matches!(err, Error::IdentityResolution(_)));
    }

    #[test]
    fn test_raw_validation() {
        assert!(TypeSignature::parse_raw("").is_err());
        assert!(TypeSignature::parse_raw("rc(Foo;{abc}").is_err());
        assert!(TypeSignature::parse_raw("rc(Foo;{abc)}").is_err());
        assert!(TypeSignature::parse_raw("b 1").is_err());
        assert!(TypeSignature::parse_raw("rc(Foo;{abc})").is_ok());

        let smuggled = TypeSignature::Raw(")(".to_string());
        assert!(completed_handler_iid(&smuggled).is_err());
    }

    #[test]
    fn test_iid_of_non_interface() {
        assert!(TypeSignature::Int32.iid().is_err());
        assert_eq!(
            TypeSignature::Interface(IBLUETOOTH_ADAPTER).iid().unwrap(),
            IBLUETOOTH_ADAPTER
        );
    }
}
