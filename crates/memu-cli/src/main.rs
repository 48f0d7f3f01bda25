use std::{io::Write, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use memu_core::{KeyCode, Memuc, MemucConfig, VmConfig};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "memu", version, about = "Drive MEmu instances through memuc")]
struct Cli {
    /// Path to memuc.exe (overrides config file and MEMU_MEMUC_PATH)
    #[arg(long, global = true)]
    memuc: Option<PathBuf>,
    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Instance lifecycle commands
    Vm {
        #[command(subcommand)]
        cmd: VmCmd,
    },
    /// Android application commands
    App {
        #[command(subcommand)]
        cmd: AppCmd,
    },
    /// Simulated input
    Input {
        #[command(subcommand)]
        cmd: InputCmd,
    },
    /// List running Android packages
    Ps { index: usize },
    /// Capture the screen as a BMP file ("-" writes to stdout)
    Screencap {
        index: usize,
        #[arg(long, short, default_value = "screen.bmp")]
        out: PathBuf,
    },
    /// Show or persist the effective configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

impl Cmd {
    /// Instance the command addresses, if any.
    fn index(&self) -> Option<usize> {
        match self {
            Cmd::Vm { cmd } => match cmd {
                VmCmd::List => None,
                VmCmd::Start { index }
                | VmCmd::Stop { index }
                | VmCmd::Reboot { index }
                | VmCmd::Configure { index, .. }
                | VmCmd::Set { index, .. } => Some(*index),
            },
            Cmd::App { cmd } => match cmd {
                AppCmd::Start { index, .. } | AppCmd::Stop { index, .. } => Some(*index),
            },
            Cmd::Input { cmd } => match cmd {
                InputCmd::Key { index, .. }
                | InputCmd::Tap { index, .. }
                | InputCmd::Swipe { index, .. }
                | InputCmd::Zoom { index, .. } => Some(*index),
            },
            Cmd::Ps { index } | Cmd::Screencap { index, .. } => Some(*index),
            Cmd::Config { .. } => None,
        }
    }
}

#[derive(Subcommand)]
enum VmCmd {
    /// List instances
    List,
    /// Start an instance
    Start { index: usize },
    /// Stop an instance
    Stop { index: usize },
    /// Reboot an instance
    Reboot { index: usize },
    /// Set a custom resolution and DPI (defaults come from the config file)
    Configure {
        index: usize,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        dpi: Option<u16>,
    },
    /// Set a raw setconfigex key
    Set {
        index: usize,
        key: String,
        value: String,
    },
}

#[derive(Subcommand)]
enum AppCmd {
    /// Launch a package
    Start { index: usize, package: String },
    /// Force-stop a package
    Stop { index: usize, package: String },
}

#[derive(Subcommand)]
enum InputCmd {
    /// Press a device key
    Key { index: usize, key: KeyArg },
    /// Tap at a screen position
    Tap { index: usize, x: u32, y: u32 },
    /// Swipe between two screen positions
    Swipe {
        index: usize,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        #[arg(long, default_value_t = 300)]
        duration_ms: u32,
    },
    /// Zoom in (positive factor) or out
    Zoom {
        index: usize,
        #[arg(allow_negative_numbers = true)]
        factor: i32,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the state dir
    Save,
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyArg {
    Menu,
    Home,
    Back,
    VolumeUp,
    VolumeDown,
}

impl From<KeyArg> for KeyCode {
    fn from(key: KeyArg) -> Self {
        match key {
            KeyArg::Menu => KeyCode::Menu,
            KeyArg::Home => KeyCode::Home,
            KeyArg::Back => KeyCode::Back,
            KeyArg::VolumeUp => KeyCode::VolumeUp,
            KeyArg::VolumeDown => KeyCode::VolumeDown,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    memu_util::init_tracing()?;
    let cli = Cli::parse();

    let mut config = MemucConfig::load();
    if let Some(path) = cli.memuc {
        config.memuc_path = path;
    }

    if let Some(index) = cli.cmd.index() {
        check_index(index, config.max_instances)?;
    }

    let memuc = Memuc::new(config);

    match cli.cmd {
        Cmd::Vm { cmd } => match cmd {
            VmCmd::List => {
                let vms = memuc.list_vms()?;
                if cli.json {
                    print_json(&vms)?;
                } else {
                    for vm in vms {
                        println!(
                            "{}\t{}\tenabled={}\tstatus={}",
                            vm.index, vm.name, vm.enabled, vm.status
                        );
                    }
                }
            }
            VmCmd::Start { index } => {
                memuc.start_vm(index)?;
                println!("started={index}");
            }
            VmCmd::Stop { index } => {
                memuc.stop_vm(index)?;
                println!("stopped={index}");
            }
            VmCmd::Reboot { index } => {
                memuc.reboot_vm(index)?;
                println!("rebooting={index}");
            }
            VmCmd::Configure {
                index,
                width,
                height,
                dpi,
            } => {
                let defaults = memuc.config().vm;
                let vm = VmConfig {
                    width: width.unwrap_or(defaults.width),
                    height: height.unwrap_or(defaults.height),
                    dpi: dpi.unwrap_or(defaults.dpi),
                };
                memuc.apply_vm_config(index, &vm)?;
                println!("configured={index}\t{}x{}\tdpi={}", vm.width, vm.height, vm.dpi);
            }
            VmCmd::Set { index, key, value } => {
                memuc.set_config(index, &key, &value)?;
                println!("{key}={value}");
            }
        },

        Cmd::App { cmd } => match cmd {
            AppCmd::Start { index, package } => {
                memuc.start_app(index, &package)?;
                println!("started={package}");
            }
            AppCmd::Stop { index, package } => {
                memuc.stop_app(index, &package)?;
                println!("stopped={package}");
            }
        },

        Cmd::Input { cmd } => match cmd {
            InputCmd::Key { index, key } => memuc.trigger_key(index, key.into())?,
            InputCmd::Tap { index, x, y } => memuc.trigger_click(index, (x, y))?,
            InputCmd::Swipe {
                index,
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => memuc.trigger_swipe(index, (x1, y1), (x2, y2), duration_ms)?,
            InputCmd::Zoom { index, factor } => memuc.trigger_zoom(index, factor)?,
        },

        Cmd::Ps { index } => {
            let procs = memuc.list_processes(index)?;
            if cli.json {
                print_json(&procs)?;
            } else {
                for p in procs {
                    println!("{}", p.name);
                }
            }
        }

        Cmd::Screencap { index, out } => {
            let image = memuc.screen_cap(index)?;
            if out.as_os_str() == "-" {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&image)?;
                stdout.flush()?;
            } else {
                std::fs::write(&out, &*image)?;
                info!("wrote {} bytes to {}", image.len(), out.display());
            }
        }

        Cmd::Config { cmd } => match cmd {
            ConfigCmd::Show => print_json(memuc.config())?,
            ConfigCmd::Save => {
                memuc.config().save()?;
                println!("saved={}", memu_core::config::config_path().display());
            }
        },
    }

    Ok(())
}

fn check_index(index: usize, max_instances: usize) -> Result<(), String> {
    if index >= max_instances {
        return Err(format!(
            "instance index {index} out of range (max_instances is {max_instances})"
        ));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
