//! SMCP1 command codes, option flags and status words

use std::fmt;

macro_rules! commands {
    ($($(#[$doc:meta])* $name:ident = $code:literal => $label:literal,)+) => {
        /// SMCP1 command and notification codes (the header `type` field)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u16)]
        pub enum Command {
            $($(#[$doc])* $name = $code,)+
        }

        impl Command {
            /// Convert from the wire code
            #[must_use]
            pub fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($code => Some(Self::$name),)+
                    _ => None,
                }
            }

            /// Protocol name of the command
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => $label,)+
                }
            }
        }
    };
}

commands! {
    /// Liveness probe
    Ping = 0 => "PING",
    /// Stop all movement
    Stop = 1 => "STOP",
    /// Enter sleep mode
    Sleep = 2 => "SLEEP",
    /// Reboot the device
    Reboot = 3 => "REBOOT",
    /// Drive axes to their zero position
    InitZero = 4 => "INIT_ZERO",
    /// Calibrate the load
    Calibrate = 5 => "CALIBRATE",
    /// Run the drive loop
    DriveLoop = 6 => "DRIVE_LOOP",
    /// Leave sleep mode
    Wakeup = 7 => "WAKEUP",
    /// Store the current position as zero
    SaveZero = 8 => "SAVE_ZERO",
    /// Write a feature flag
    SetFeature = 11 => "SET_FEATURE",
    /// Read a feature flag
    GetFeature = 12 => "GET_FEATURE",
    /// Read all feature flags
    GetFeatures = 13 => "GET_FEATURES",
    /// Read axis positions
    GetPositions = 14 => "GET_POSITIONS",
    /// Write a parameter
    SetParameter = 15 => "SET_PARAMETER",
    /// Read a parameter
    GetParameter = 16 => "GET_PARAMETER",
    /// Write an extended feature flag
    SetExtFeature = 17 => "SET_EXT_FEATURE",
    /// Read an extended feature flag
    GetExtFeature = 18 => "GET_EXT_FEATURE",
    /// Read all extended feature flags
    GetExtFeatures = 19 => "GET_EXT_FEATURES",
    /// Set LED state
    SetLed = 21 => "SET_LED",
    /// Read LED state
    GetLed = 22 => "GET_LED",
    /// Read firmware version
    GetVersion = 23 => "GET_VERSION",
    /// Read device info text
    GetInfoText = 24 => "GET_INFO_TEXT",
    /// Store a memory position
    StoreMem = 31 => "STORE_MEM",
    /// Drive to a memory position
    GotoMem = 32 => "GOTO_MEM",
    /// Drive to a position
    GotoPos = 33 => "GOTO_POS",
    /// Take a relative step
    TakeStep = 34 => "TAKE_STEP",
    /// Take a relative step, legacy argument layout
    TakeLegacyStep = 35 => "TAKE_LEGACY_STEP",
    /// Read acceleration settings
    GetAccelerations = 36 => "GET_ACCELERATIONS",
    /// Read the error state
    ReadErrorState = 41 => "READ_ERROR_STATE",
    /// Clear the error state
    ClearErrorState = 42 => "CLEAR_ERROR_STATE",
    /// Read the axis angle
    GetAxisAngle = 44 => "GET_AXIS_ANGLE",
    /// Drive the virtual axis
    GotoVirtualAxisPosition = 45 => "GOTO_VIRTUAL_AXIS_POSITION",
    /// Write a feature mask
    SetFeatureMask = 46 => "SET_FEATURE_MASK",
    /// Read a feature mask
    GetFeatureMask = 47 => "GET_FEATURE_MASK",
    /// Read all feature masks
    GetFeaturesMask = 48 => "GET_FEATURES_MASK",
    /// Read feature functionality
    GetFeatureFunctionality = 49 => "GET_FEATURE_FUNCTIONALITY",
    /// Stage: set resolution
    UmsSetResolution = 60 => "UMS_SET_RESOLUTION",
    /// Stage: write pulses
    UmsWritePulses = 61 => "UMS_WRITE_PULSES",
    /// Stage: read hardware limits
    UmsGetHwLimits = 62 => "UMS_GET_HW_LIMITS",
    /// Stage: read lens position
    UmsGetLensPosition = 63 => "UMS_GET_LENS_POSITION",
    /// Stage: set lens position
    UmsSetLensPosition = 64 => "UMS_SET_LENS_POSITION",
    /// Stage: write bowl control
    UmsSetBowlControl = 65 => "UMS_SET_BOWL_CONTROL",
    /// Stage: read bowl control
    UmsGetBowlControl = 66 => "UMS_GET_BOWL_CONTROL",
    /// Stage: write objective configuration
    UmsSetObjectiveControl = 67 => "UMS_SET_OBJECTIVE_CONTROL",
    /// Stage: read objective configuration
    UmsGetObjectiveControl = 68 => "UMS_GET_OBJECTIVE_CONTROL",
    /// Amplifier: reset
    ResetUma = 74 => "RESET_UMA",
    /// Amplifier: write registers
    SetUmaRegs = 75 => "SET_UMA_REGS",
    /// Amplifier: write one register
    SetUmaReg = 76 => "SET_UMA_REG",
    /// Amplifier: read registers
    GetUmaRegs = 77 => "GET_UMA_REGS",
    /// Amplifier: read one register
    GetUmaReg = 78 => "GET_UMA_REG",
    /// Amplifier: set stimulus
    SetUmaStimulus = 79 => "SET_UMA_STIMULUS",
    /// Pressure: calibrate sensors
    PressureCalib = 86 => "PRESSURE_CALIB",
    /// Pressure: reset sensor offset
    ResetSensorOffset = 87 => "RESET_SENSOR_OFFSET",
    /// Pressure: set channel pressure
    SetPressure = 88 => "SET_PRESSURE",
    /// Pressure: read channel pressure setting
    GetPressure = 89 => "GET_PRESSURE",
    /// Pressure: write DAC
    SetDac = 90 => "SET_DAC",
    /// Pressure: read DAC
    GetDac = 91 => "GET_DAC",
    /// Pressure: set valve
    SetValve = 92 => "SET_VALVE",
    /// Pressure: read valve
    GetValve = 93 => "GET_VALVE",
    /// Pressure: measure channel pressure
    MeasurePressure = 94 => "MEASURE_PRESSURE",
    /// Pressure: read monitor ADC
    GetMonitorAdc = 95 => "GET_MONITOR_ADC",
    /// Pressure: reset fluid detector
    ResetFluidDetector = 96 => "RESET_FLUID_DETECTOR",
    /// Pressure: read fluid detectors
    ReadFluidDetectors = 97 => "READ_FLUID_DETECTORS",
    /// Pressure: start sequence
    StartSequence = 98 => "START_SEQUENCE",
    /// Pressure: record sequence
    RecordSequence = 99 => "RECORD_SEQUENCE",
    /// Notification: device announced itself
    Hello = 100 => "HELLO",
    /// Notification: positions changed
    PositionChanged = 101 => "POSITION_CHANGED",
    /// Notification: status word changed
    StatusChanged = 102 => "STATUS_CHANGED",
    /// Notification: zero drive completed
    GotoZeroCompleted = 103 => "GOTO_ZERO_COMPLETED",
    /// Notification: position or memory drive completed
    GotoPosCompleted = 104 => "GOTO_POS_COMPLETED",
    /// Notification: calibration completed
    CalibrateCompleted = 121 => "CALIBRATE_COMPLETED",
    /// Notification: drive loop completed
    DriveLoopCompleted = 122 => "DRIVE_LOOP_COMPLETED",
    /// Notification: pressure changed
    PressureChanged = 150 => "PRESSURE_CHANGED",
    /// Notification: raw amplifier samples
    UmaSamples = 200 => "UMA_SAMPLES",
}

impl Command {
    /// Convert to the wire code
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether the device answers this command with a completion notification
    #[must_use]
    pub const fn requests_completion(self) -> bool {
        matches!(self, Self::GotoMem | Self::GotoPos)
    }

    /// Whether sending this command means emulating a device notification
    #[must_use]
    pub const fn is_emulated_notification(self) -> bool {
        matches!(self, Self::PositionChanged | Self::StatusChanged)
    }

    /// Whether the command may start axis movement
    #[must_use]
    pub const fn may_cause_movement(self) -> bool {
        matches!(
            self,
            Self::InitZero
                | Self::Calibrate
                | Self::DriveLoop
                | Self::GotoMem
                | Self::GotoPos
                | Self::TakeStep
                | Self::TakeLegacyStep
        )
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> Self {
        command.as_u16()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Frame option bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options(u32);

impl Options {
    /// Frame is a request
    pub const REQ: u32 = 0x0000_0001;
    /// Frame is an acknowledgement
    pub const ACK: u32 = 0x0000_0002;
    /// Frame is a notification
    pub const NOTIFY: u32 = 0x0000_0004;
    /// Frame carries an error
    pub const ERROR: u32 = 0x0000_0008;
    /// Sender wants an acknowledgement
    pub const REQ_ACK: u32 = 0x0000_0010;
    /// Sender wants a typed response
    pub const REQ_RESP: u32 = 0x0000_0020;
    /// Sender wants a completion notification
    pub const REQ_NOTIFY: u32 = 0x0000_0040;
    /// Response should be broadcast
    pub const REQ_BCAST: u32 = 0x0000_0080;
    /// High priority request
    pub const PRIORITY: u32 = 0x0000_0100;
    /// Execute on trigger input 1
    pub const WAIT_TRIGGER_1: u32 = 0x0000_0200;

    const NAMES: [(u32, &'static str); 10] = [
        (Self::REQ, "REQ"),
        (Self::ACK, "ACK"),
        (Self::NOTIFY, "NOTIFY"),
        (Self::ERROR, "ERROR"),
        (Self::REQ_ACK, "REQ_ACK"),
        (Self::REQ_RESP, "REQ_RESP"),
        (Self::REQ_NOTIFY, "REQ_NOTIFY"),
        (Self::REQ_BCAST, "REQ_BCAST"),
        (Self::PRIORITY, "PRIORITY"),
        (Self::WAIT_TRIGGER_1, "WAIT_TRIGGER_1"),
    ];

    /// Create empty options
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Create from raw bits; unknown bits are preserved
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Set a flag
    #[must_use]
    pub const fn with(mut self, flag: u32) -> Self {
        self.0 |= flag;
        self
    }

    /// Check if any of the given bits is set
    #[must_use]
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Whether no bits are set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

/// Sub-block element types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DataType {
    /// No data
    Void = 0,
    /// Unsigned 8-bit
    Uint8 = 1,
    /// Signed 8-bit
    Int8 = 2,
    /// Unsigned 16-bit
    Uint16 = 3,
    /// Signed 16-bit
    Int16 = 4,
    /// Unsigned 32-bit
    Uint32 = 5,
    /// Signed 32-bit
    Int32 = 6,
    /// Unsigned 64-bit
    Uint64 = 7,
    /// Signed 64-bit
    Int64 = 8,
    /// Character string; the element count is a byte count
    CharString = 9,
}

impl DataType {
    /// Convert from the wire code
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Void),
            1 => Some(Self::Uint8),
            2 => Some(Self::Int8),
            3 => Some(Self::Uint16),
            4 => Some(Self::Int16),
            5 => Some(Self::Uint32),
            6 => Some(Self::Int32),
            7 => Some(Self::Uint64),
            8 => Some(Self::Int64),
            9 => Some(Self::CharString),
            _ => None,
        }
    }

    /// Convert to the wire code
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Bytes occupied on the wire by `count` elements of this type.
    ///
    /// Numeric elements are carried in 32-bit slots; strings are byte counts.
    #[must_use]
    pub const fn wire_len(self, count: usize) -> usize {
        match self {
            Self::Void => 0,
            Self::CharString => count,
            _ => count * 4,
        }
    }

    /// Whether values of this type can be read as 32-bit integers
    #[must_use]
    pub const fn is_int32(self) -> bool {
        matches!(self, Self::Int32 | Self::Uint32)
    }
}

/// Raw device status word as reported by the status-changed notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus(u32);

impl DeviceStatus {
    /// Device is busy
    pub const BUSY: u32 = 0x0000_0001;
    /// Device reports an error
    pub const ERROR: u32 = 0x0000_0008;
    /// X axis moving
    pub const X_MOVING: u32 = 0x0000_0010;
    /// Y axis moving
    pub const Y_MOVING: u32 = 0x0000_0020;
    /// Z axis moving
    pub const Z_MOVING: u32 = 0x0000_0040;
    /// Fourth axis moving
    pub const W_MOVING: u32 = 0x0000_0080;
    /// Pressure channels 1..8 busy, one bit each starting here
    pub const PRESSURE_CHANNEL_BUSY: u32 = 0x0000_0100;
    /// Bits counted as busy or moving
    pub const BUSY_MASK: u32 = 0xfff1;

    /// Wrap a raw status word
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw status word
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether any busy or movement bit is set
    #[must_use]
    pub const fn is_busy(self) -> bool {
        self.0 & Self::BUSY_MASK != 0
    }

    /// Whether the error bit is set
    #[must_use]
    pub const fn has_error(self) -> bool {
        self.0 & Self::ERROR != 0
    }
}

/// Motion completion state of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriveStatus {
    /// No drive in progress, or the last one completed
    #[default]
    Completed,
    /// A drive was started and no completion has been seen
    Busy,
    /// The last drive failed
    Failed,
}

impl DriveStatus {
    /// Numeric code (0 completed, 1 busy, -1 failed)
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Busy => 1,
            Self::Failed => -1,
        }
    }
}

/// Parameter ids for `SET_PARAMETER` / `GET_PARAMETER`
pub mod param {
    /// Memory drive speed
    pub const MEM_SPEED: i32 = 2;
    /// Device id
    pub const DEV_ID: i32 = 3;
    /// Virtual X axis angle
    pub const VIRTUALX_ANGLE: i32 = 4;
    /// Axis head configuration bits
    pub const AXIS_HEAD_CONFIGURATION: i32 = 0x80;
    /// Hardware id
    pub const HW_ID: i32 = 0x101;
    /// Serial number
    pub const SN: i32 = 0x102;
    /// End of warranty
    pub const EOW: i32 = 0x103;
    /// Detected virtual X angle
    pub const VIRTUALX_DETECTED_ANGLE: i32 = 0x104;
    /// Number of axes
    pub const AXIS_COUNT: i32 = 0x105;
}

/// Feature ids for `SET_FEATURE` / `GET_FEATURE`
pub mod feature {
    /// Virtual axis
    pub const VIRTUAL_AXIS: i32 = 0;
    /// LEDs disabled
    pub const DISABLE_LEDS: i32 = 16;
    /// Movement prevented
    pub const PREVENT_MOVEMENT: i32 = 17;
}

/// Extended feature ids for `SET_EXT_FEATURE` / `GET_EXT_FEATURE`
pub mod ext_feature {
    /// Custom low speed mode
    pub const CUST_LOW_SPEED: i32 = 32;
    /// Soft start
    pub const SOFT_START: i32 = 33;
}
