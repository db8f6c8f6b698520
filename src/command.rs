//! Device-control command set.
//!
//! Queued commands travel through the spooler and are interpreted one at a
//! time by the [`Interpreter`](crate::interpreter::Interpreter). Realtime
//! commands bypass the queue entirely and are executed on the calling thread.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Stable numeric opcode for every queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    Cut = 1,
    Move = 2,
    Jog = 3,
    JogSwitch = 4,
    JogFinish = 5,
    Home = 6,
    Lock = 7,
    Unlock = 8,
    Plot = 9,
    PlotStart = 10,
    SetSpeed = 20,
    SetPower = 21,
    SetPpi = 22,
    SetPwm = 23,
    SetStep = 24,
    SetOverscan = 25,
    SetAcceleration = 26,
    SetDRatio = 27,
    SetDirection = 28,
    SetIncremental = 29,
    SetAbsolute = 30,
    SetPosition = 31,
    ModeRapid = 40,
    ModeProgram = 41,
    ModeFinished = 42,
    Wait = 50,
    WaitFinish = 51,
    Beep = 52,
    Function = 53,
    Signal = 54,
    LaserOn = 60,
    LaserOff = 61,
    LaserEnable = 62,
    LaserDisable = 63,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command code {0}")]
pub struct UnknownCode(pub u16);

impl TryFrom<u16> for CommandCode {
    type Error = UnknownCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        use CommandCode::*;
        let code = match value {
            1 => Cut,
            2 => Move,
            3 => Jog,
            4 => JogSwitch,
            5 => JogFinish,
            6 => Home,
            7 => Lock,
            8 => Unlock,
            9 => Plot,
            10 => PlotStart,
            20 => SetSpeed,
            21 => SetPower,
            22 => SetPpi,
            23 => SetPwm,
            24 => SetStep,
            25 => SetOverscan,
            26 => SetAcceleration,
            27 => SetDRatio,
            28 => SetDirection,
            29 => SetIncremental,
            30 => SetAbsolute,
            31 => SetPosition,
            40 => ModeRapid,
            41 => ModeProgram,
            42 => ModeFinished,
            50 => Wait,
            51 => WaitFinish,
            52 => Beep,
            53 => Function,
            54 => Signal,
            60 => LaserOn,
            61 => LaserOff,
            62 => LaserEnable,
            63 => LaserDisable,
            other => return Err(UnknownCode(other)),
        };
        Ok(code)
    }
}

impl CommandCode {
    pub fn name(self) -> &'static str {
        use CommandCode::*;
        match self {
            Cut => "CUT",
            Move => "MOVE",
            Jog => "JOG",
            JogSwitch => "JOG_SWITCH",
            JogFinish => "JOG_FINISH",
            Home => "HOME",
            Lock => "LOCK",
            Unlock => "UNLOCK",
            Plot => "PLOT",
            PlotStart => "PLOT_START",
            SetSpeed => "SET_SPEED",
            SetPower => "SET_POWER",
            SetPpi => "SET_PPI",
            SetPwm => "SET_PWM",
            SetStep => "SET_STEP",
            SetOverscan => "SET_OVERSCAN",
            SetAcceleration => "SET_ACCELERATION",
            SetDRatio => "SET_D_RATIO",
            SetDirection => "SET_DIRECTION",
            SetIncremental => "SET_INCREMENTAL",
            SetAbsolute => "SET_ABSOLUTE",
            SetPosition => "SET_POSITION",
            ModeRapid => "MODE_RAPID",
            ModeProgram => "MODE_PROGRAM",
            ModeFinished => "MODE_FINISHED",
            Wait => "WAIT",
            WaitFinish => "WAIT_FINISH",
            Beep => "BEEP",
            Function => "FUNCTION",
            Signal => "SIGNAL",
            LaserOn => "LASER_ON",
            LaserOff => "LASER_OFF",
            LaserEnable => "LASER_ENABLE",
            LaserDisable => "LASER_DISABLE",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sub-mode passed to the backend jog hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JogMode {
    #[default]
    Default,
    Switch,
    Finish,
}

impl JogMode {
    /// Maps the `opt_jog_mode` setting onto a mode; unknown values fall back to `Default`.
    pub fn from_setting(value: i32) -> Self {
        match value {
            1 => JogMode::Switch,
            2 => JogMode::Finish,
            _ => JogMode::Default,
        }
    }
}

/// One element of a backend plot stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotStep {
    pub x: i32,
    pub y: i32,
    pub laser_on: bool,
}

/// Callable carried by `FUNCTION`. Compared by identity.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn() + Send + Sync>);

impl Callback {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A queued device command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Cut { x: i32, y: i32 },
    Move { x: i32, y: i32 },
    Jog { x: i32, y: i32 },
    JogSwitch { x: i32, y: i32 },
    JogFinish { x: i32, y: i32 },
    Home,
    Lock,
    Unlock,
    Plot(PlotStep),
    PlotStart,
    SetSpeed(f64),
    SetPower(f64),
    SetPpi(f64),
    SetPwm(f64),
    SetStep(i32),
    SetOverscan(f64),
    SetAcceleration(i32),
    SetDRatio(f64),
    SetDirection { left: bool, top: bool, x_dir: bool, y_dir: bool },
    SetIncremental,
    SetAbsolute,
    SetPosition { x: i32, y: i32 },
    ModeRapid,
    ModeProgram,
    ModeFinished,
    Wait(Duration),
    WaitFinish,
    Beep,
    Function(Callback),
    Signal { name: String, args: Vec<Value> },
    LaserOn,
    LaserOff,
    LaserEnable,
    LaserDisable,
    /// A bare opcode as received from a producer. Only argument-free codes
    /// decode; anything else is reported as unrecognized at dispatch.
    Raw(u16),
}

impl Command {
    /// Opcode of this command, or `None` for a raw opcode that does not decode.
    pub fn code(&self) -> Option<CommandCode> {
        use Command::*;
        let code = match self {
            Cut { .. } => CommandCode::Cut,
            Move { .. } => CommandCode::Move,
            Jog { .. } => CommandCode::Jog,
            JogSwitch { .. } => CommandCode::JogSwitch,
            JogFinish { .. } => CommandCode::JogFinish,
            Home => CommandCode::Home,
            Lock => CommandCode::Lock,
            Unlock => CommandCode::Unlock,
            Plot(_) => CommandCode::Plot,
            PlotStart => CommandCode::PlotStart,
            SetSpeed(_) => CommandCode::SetSpeed,
            SetPower(_) => CommandCode::SetPower,
            SetPpi(_) => CommandCode::SetPpi,
            SetPwm(_) => CommandCode::SetPwm,
            SetStep(_) => CommandCode::SetStep,
            SetOverscan(_) => CommandCode::SetOverscan,
            SetAcceleration(_) => CommandCode::SetAcceleration,
            SetDRatio(_) => CommandCode::SetDRatio,
            SetDirection { .. } => CommandCode::SetDirection,
            SetIncremental => CommandCode::SetIncremental,
            SetAbsolute => CommandCode::SetAbsolute,
            SetPosition { .. } => CommandCode::SetPosition,
            ModeRapid => CommandCode::ModeRapid,
            ModeProgram => CommandCode::ModeProgram,
            ModeFinished => CommandCode::ModeFinished,
            Wait(_) => CommandCode::Wait,
            WaitFinish => CommandCode::WaitFinish,
            Beep => CommandCode::Beep,
            Function(_) => CommandCode::Function,
            Signal { .. } => CommandCode::Signal,
            LaserOn => CommandCode::LaserOn,
            LaserOff => CommandCode::LaserOff,
            LaserEnable => CommandCode::LaserEnable,
            LaserDisable => CommandCode::LaserDisable,
            Raw(raw) => return Command::decode_raw(*raw).and_then(|c| c.code()),
        };
        Some(code)
    }

    /// Builds the argument-free command for `code`, if it has one.
    pub fn from_code(code: CommandCode) -> Option<Command> {
        use CommandCode::*;
        let command = match code {
            Home => Command::Home,
            Lock => Command::Lock,
            Unlock => Command::Unlock,
            PlotStart => Command::PlotStart,
            SetIncremental => Command::SetIncremental,
            SetAbsolute => Command::SetAbsolute,
            ModeRapid => Command::ModeRapid,
            ModeProgram => Command::ModeProgram,
            ModeFinished => Command::ModeFinished,
            WaitFinish => Command::WaitFinish,
            Beep => Command::Beep,
            LaserOn => Command::LaserOn,
            LaserOff => Command::LaserOff,
            LaserEnable => Command::LaserEnable,
            LaserDisable => Command::LaserDisable,
            _ => return None,
        };
        Some(command)
    }

    pub fn decode_raw(raw: u16) -> Option<Command> {
        CommandCode::try_from(raw).ok().and_then(Command::from_code)
    }

    pub fn signal(name: impl Into<String>, args: Vec<Value>) -> Self {
        Command::Signal { name: name.into(), args }
    }

    pub fn function(f: impl Fn() + Send + Sync + 'static) -> Self {
        Command::Function(Callback::new(f))
    }
}

/// Out-of-band control commands. Never queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RealtimeCommand {
    Pause,
    Resume,
    Reset,
    Status,
    SafetyDoor,
    JogCancel,
    SpeedPercent(f64),
    Speed(f64),
    RapidPercent(f64),
    Rapid(f64),
    PowerPercent(f64),
    Power(f64),
    Overscan(f64),
    LaserDisable,
    LaserEnable,
    FloodCoolant(bool),
    MistCoolant(bool),
}

impl RealtimeCommand {
    pub fn name(&self) -> &'static str {
        use RealtimeCommand::*;
        match self {
            Pause => "PAUSE",
            Resume => "RESUME",
            Reset => "RESET",
            Status => "STATUS",
            SafetyDoor => "SAFETY_DOOR",
            JogCancel => "JOG_CANCEL",
            SpeedPercent(_) => "SPEED_PERCENT",
            Speed(_) => "SPEED",
            RapidPercent(_) => "RAPID_PERCENT",
            Rapid(_) => "RAPID",
            PowerPercent(_) => "POWER_PERCENT",
            Power(_) => "POWER",
            Overscan(_) => "OVERSCAN",
            LaserDisable => "LASER_DISABLE",
            LaserEnable => "LASER_ENABLE",
            FloodCoolant(_) => "FLOOD_COOLANT",
            MistCoolant(_) => "MIST_COOLANT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_for_every_opcode() {
        for raw in 0u16..100 {
            if let Ok(code) = CommandCode::try_from(raw) {
                assert_eq!(code as u16, raw);
            }
        }
        assert_eq!(CommandCode::try_from(999), Err(UnknownCode(999)));
    }

    #[test]
    fn test_raw_decoding_only_accepts_argument_free_codes() {
        assert_eq!(Command::decode_raw(CommandCode::Home as u16), Some(Command::Home));
        assert_eq!(Command::decode_raw(CommandCode::LaserOff as u16), Some(Command::LaserOff));
        assert_eq!(Command::decode_raw(CommandCode::Move as u16), None);
        assert_eq!(Command::decode_raw(7777), None);
        assert_eq!(Command::Raw(CommandCode::Home as u16).code(), Some(CommandCode::Home));
        assert_eq!(Command::Raw(CommandCode::Cut as u16).code(), None);
    }

    #[test]
    fn test_callbacks_compare_by_identity() {
        let a = Callback::new(|| {});
        let b = Callback::new(|| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_jog_mode_from_setting() {
        assert_eq!(JogMode::from_setting(0), JogMode::Default);
        assert_eq!(JogMode::from_setting(1), JogMode::Switch);
        assert_eq!(JogMode::from_setting(2), JogMode::Finish);
        assert_eq!(JogMode::from_setting(42), JogMode::Default);
    }
}
