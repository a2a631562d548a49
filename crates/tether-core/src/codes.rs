//! Integer-backed enums exchanged with the native library.
//!
//! `int_enum!` generates a `#[repr(i32)]` enum with `TryFrom<i32>`,
//! `TryFrom<u32>` and a `Display` that prints the variant name.

#[macro_export]
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident { $($variant:ident $(= $value:expr)?),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant $(= $value)?,)+
        }

        impl TryFrom<i32> for $name {
            type Error = $crate::error::BoundaryError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                $(
                    if value == Self::$variant as i32 {
                        return Ok(Self::$variant);
                    }
                )+
                Err($crate::error::BoundaryError::UnrecognizedEnumValue(
                    i64::from(value),
                    stringify!($name),
                ))
            }
        }

        impl TryFrom<u32> for $name {
            type Error = $crate::error::BoundaryError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                i32::try_from(value)
                    .map_err(|_| {
                        $crate::error::BoundaryError::UnrecognizedEnumValue(
                            i64::from(value),
                            stringify!($name),
                        )
                    })
                    .and_then(Self::try_from)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)+
                }
            }
        }
    };
}

const MQTT_PACKAGE_ID: i32 = 5;
const ERROR_ENUM_STRIDE_BITS: i32 = 10;

/// First value of the native MQTT error range.
pub const MQTT_ERROR_BASE: i32 = MQTT_PACKAGE_ID * (1 << ERROR_ENUM_STRIDE_BITS);

int_enum!(
    /// MQTT quality of service. `Failure` only appears in SUBACK packets.
    pub enum Qos {
        AtMostOnce = 0x0,
        AtLeastOnce = 0x1,
        ExactlyOnce = 0x2,
        Failure = 0x80,
    }
);

int_enum!(
    /// CONNACK return code reported on connection completion and resumption.
    pub enum ConnectReturnCode {
        Accepted = 0,
        UnacceptableProtocolVersion,
        IdentifierRejected,
        ServerUnavailable,
        BadUsernameOrPassword,
        NotAuthorized,
    }
);

int_enum!(
    /// Error codes the native MQTT layer reports through `error_code` arguments.
    pub enum MqttErrorCode {
        InvalidReservedBits = MQTT_ERROR_BASE,
        BufferTooBig,
        InvalidRemainingLength,
        UnsupportedProtocolName,
        UnsupportedProtocolLevel,
        InvalidCredentials,
        InvalidQos,
        InvalidPacketType,
        InvalidTopic,
        Timeout,
        ProtocolError,
        NotConnected,
        AlreadyConnected,
        BuiltWithoutWebsockets,
        UnexpectedHangup,
        ConnectionShutdown,
        ConnectionDestroyed,
        ConnectionDisconnecting,
        CancelledForCleanSession,
        QueueFull,
        ClientOptionsValidation,
        ConnectOptionsValidation,
        DisconnectOptionsValidation,
        PublishOptionsValidation,
        SubscribeOptionsValidation,
        UnsubscribeOptionsValidation,
        UserPropertyValidation,
        PacketValidation,
        EncodeFailure,
        DecodeProtocolError,
        ConnackConnectionRefused,
        ConnackTimeout,
        PingResponseTimeout,
        UserRequestedStop,
        DisconnectReceived,
        ClientTerminated,
        OperationFailedDueToOfflineQueuePolicy,
        EncodeSizeUnsupportedPacketType,
        OperationProcessingFailure,
        InvalidInboundTopicAlias,
        InvalidOutboundTopicAlias,
        InvalidUtf8String,
        ConnectionResetForAdapterConnect,
        ConnectionResubscribeNoTopics,
    }
);

impl MqttErrorCode {
    /// Human-readable description of a raw error code, falling back to the
    /// number when it is outside the MQTT range.
    pub fn describe(error_code: i32) -> String {
        match Self::try_from(error_code) {
            Ok(code) => code.to_string(),
            Err(_) if error_code == 0 => "Success".to_string(),
            Err(_) => format!("error [{error_code}]"),
        }
    }
}

impl ConnectReturnCode {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl Default for Qos {
    fn default() -> Self {
        Self::AtLeastOnce
    }
}

impl<'de> serde::Deserialize<'de> for Qos {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        match raw {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(serde::de::Error::custom(format!(
                "invalid MQTT QoS {other}, expected 0, 1 or 2"
            ))),
        }
    }
}
