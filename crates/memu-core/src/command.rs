use std::fmt;

use crate::response::Sentinel;

/// Android key codes accepted by `input keyevent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KeyCode {
    Menu = 0,
    Home = 3,
    Back = 4,
    VolumeUp = 24,
    VolumeDown = 25,
}

impl KeyCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One memuc operation and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemucCommand<'a> {
    ListVms,
    Start { index: usize },
    Stop { index: usize },
    Reboot { index: usize },
    StartApp { index: usize, package: &'a str },
    StopApp { index: usize, package: &'a str },
    ZoomIn { index: usize },
    ZoomOut { index: usize },
    SetConfig { index: usize, key: &'a str, value: String },
    KeyEvent { index: usize, key: KeyCode },
    Swipe {
        index: usize,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u32,
    },
    Tap { index: usize, at: (u32, u32) },
    ListProcesses { index: usize },
    ScreenCap { index: usize },
}

impl MemucCommand<'_> {
    /// Marker expected in the response preamble; `None` for commands whose
    /// whole output is data.
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self {
            MemucCommand::ListVms => None,
            MemucCommand::Start { .. }
            | MemucCommand::Stop { .. }
            | MemucCommand::Reboot { .. }
            | MemucCommand::StartApp { .. }
            | MemucCommand::StopApp { .. }
            | MemucCommand::ZoomIn { .. }
            | MemucCommand::ZoomOut { .. }
            | MemucCommand::SetConfig { .. } => Some(Sentinel::Success),
            MemucCommand::KeyEvent { .. }
            | MemucCommand::Swipe { .. }
            | MemucCommand::Tap { .. }
            | MemucCommand::ListProcesses { .. }
            | MemucCommand::ScreenCap { .. } => Some(Sentinel::Connected),
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            MemucCommand::ListVms => strings(&["listvms"]),
            MemucCommand::Start { index } => strings(&["start", "-i", index.to_string().as_str()]),
            MemucCommand::Stop { index } => strings(&["stop", "-i", index.to_string().as_str()]),
            MemucCommand::Reboot { index } => strings(&["reboot", "-i", index.to_string().as_str()]),
            MemucCommand::ZoomIn { index } => strings(&["zoomin", "-i", index.to_string().as_str()]),
            MemucCommand::ZoomOut { index } => strings(&["zoomout", "-i", index.to_string().as_str()]),
            MemucCommand::StartApp { index, package } => {
                strings(&["-i", index.to_string().as_str(), "startapp", *package])
            }
            MemucCommand::StopApp { index, package } => {
                strings(&["-i", index.to_string().as_str(), "stopapp", *package])
            }
            MemucCommand::SetConfig { index, key, value } => {
                strings(&["setconfigex", "-i", index.to_string().as_str(), *key, value.as_str()])
            }
            MemucCommand::KeyEvent { index, key } => strings(&[
                "-i",
                index.to_string().as_str(),
                "adb",
                "shell",
                "input",
                "keyevent",
                key.to_string().as_str(),
            ]),
            MemucCommand::Swipe {
                index,
                from,
                to,
                duration_ms,
            } => strings(&[
                "-i",
                index.to_string().as_str(),
                "adb",
                "shell",
                "input",
                "swipe",
                from.0.to_string().as_str(),
                from.1.to_string().as_str(),
                to.0.to_string().as_str(),
                to.1.to_string().as_str(),
                duration_ms.to_string().as_str(),
            ]),
            MemucCommand::Tap { index, at } => strings(&[
                "-i",
                index.to_string().as_str(),
                "adb",
                "shell",
                "input",
                "tap",
                at.0.to_string().as_str(),
                at.1.to_string().as_str(),
            ]),
            MemucCommand::ListProcesses { index } => {
                strings(&["-i", index.to_string().as_str(), "adb", "shell", "ps"])
            }
            MemucCommand::ScreenCap { index } => {
                strings(&["-i", index.to_string().as_str(), "adb", "exec-out", "screencap"])
            }
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
