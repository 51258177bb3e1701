//! Error taxonomy shared by the dispatcher and the facade

use pinwire_protocol::{EncodingError, PinId, PinMode};

/// Operation families, used to label errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationKind {
    SetPinMode,
    DigitalWrite,
    PwmWrite,
    ServoWrite,
    DigitalRead,
    AnalogRead,
    SerialBegin,
    SerialPrint,
    SerialRead,
    Tone,
    Sequence,
    FirmwareQuery,
    Reset,
}

impl OperationKind {
    /// Returns true for operations that wait on a device report
    pub fn is_read(self) -> bool {
        matches!(
            self,
            OperationKind::DigitalRead | OperationKind::AnalogRead | OperationKind::FirmwareQuery
        )
    }

    /// Mode the operation needs on its target pin
    pub fn required_mode(self) -> Option<PinMode> {
        match self {
            OperationKind::DigitalWrite => Some(PinMode::Output),
            OperationKind::PwmWrite => Some(PinMode::PwmOutput),
            OperationKind::ServoWrite => Some(PinMode::ServoOutput),
            OperationKind::DigitalRead => Some(PinMode::Input),
            OperationKind::AnalogRead => Some(PinMode::AnalogInput),
            _ => None,
        }
    }
}

/// Why a request was rejected before anything was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationReason {
    /// Pin is not in the capability table
    UnknownPin,
    /// Pin does not support the mode
    UnsupportedMode(PinMode),
    /// Value outside the legal range of the mode
    ValueOutOfRange { value: u32, max: u32 },
    /// Pin is configured for a different mode
    ModeMismatch { configured: PinMode, required: PinMode },
    /// Tone frequency must be positive
    InvalidFrequency,
    /// Bend step factor must be greater than one
    InvalidStepFactor,
    /// Bend would need more tone steps than allowed
    TooManySteps,
    /// Profile has no tone output
    NoTonePin,
    /// Profile cannot run actuator sequences
    SequencesUnsupported,
}

/// Rejected request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidationError {
    pub op: OperationKind,
    pub pin: Option<PinId>,
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn new(op: OperationKind, pin: Option<PinId>, reason: ValidationReason) -> Self {
        Self { op, pin, reason }
    }
}

/// Transport-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Channel is closed (no writer attached or link down)
    Closed,
    /// Underlying write failed
    WriteFailed,
    /// Underlying read failed
    ReadFailed,
    /// Receive stream lost framing for longer than allowed
    Desync,
}

/// Errors returned by link operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    Validation(ValidationError),
    Encoding(EncodingError),
    Transport(TransportError),
    /// No matching report before the deadline
    ReadTimeout,
    /// Link went down while waiting, or is down
    ConnectionLost,
    /// Pin has not been given a mode
    NotConfigured {
        op: OperationKind,
        pin: Option<PinId>,
    },
    /// Every pending-read slot is in use
    Busy,
}

impl From<ValidationError> for LinkError {
    fn from(e: ValidationError) -> Self {
        LinkError::Validation(e)
    }
}

impl From<EncodingError> for LinkError {
    fn from(e: EncodingError) -> Self {
        LinkError::Encoding(e)
    }
}

impl From<TransportError> for LinkError {
    fn from(e: TransportError) -> Self {
        LinkError::Transport(e)
    }
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinkError::Validation(e) => write!(f, "{:?} rejected: {:?}", e.op, e.reason),
            LinkError::Encoding(e) => write!(f, "encoding failed: {:?}", e),
            LinkError::Transport(e) => write!(f, "transport error: {:?}", e),
            LinkError::ReadTimeout => write!(f, "read timed out"),
            LinkError::ConnectionLost => write!(f, "connection lost"),
            LinkError::NotConfigured { op, pin } => {
                write!(f, "{:?} on unconfigured pin {:?}", op, pin)
            }
            LinkError::Busy => write!(f, "too many pending reads"),
        }
    }
}
