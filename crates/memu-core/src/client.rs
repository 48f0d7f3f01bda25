use std::fmt::Display;

use tracing::{debug, info};

use crate::bitmap;
use crate::command::{KeyCode, MemucCommand};
use crate::config::{MemucConfig, VmConfig};
use crate::error::Result;
use crate::framebuffer;
use crate::launcher::{Invocation, Launcher, SystemLauncher};
use crate::listing::{self, InstanceRecord, ProcessRecord};
use crate::pool::{BufferPool, SlotView};
use crate::response::{self, Sentinel};

/// Drives MEmu instances through `memuc`.
///
/// Every call blocks until memuc exits. The client is `Sync`: different
/// instances may be driven from different threads, while captures on the
/// same instance serialize on that instance's buffer.
pub struct Memuc {
    config: MemucConfig,
    launcher: Box<dyn Launcher>,
    pool: BufferPool,
}

impl Memuc {
    pub fn new(config: MemucConfig) -> Self {
        Self::with_launcher(config, Box::new(SystemLauncher))
    }

    pub fn with_launcher(config: MemucConfig, launcher: Box<dyn Launcher>) -> Self {
        let pool = BufferPool::new(config.max_instances, config.vm.max_image_bytes());
        Self {
            config,
            launcher,
            pool,
        }
    }

    pub fn config(&self) -> &MemucConfig {
        &self.config
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn list_vms(&self) -> Result<Vec<InstanceRecord>> {
        let raw = self.invoke(&MemucCommand::ListVms)?;
        let records = listing::parse_instances(&response::decode_text(&raw))?;
        debug!(count = records.len(), "listed vms");
        Ok(records)
    }

    /// Boots instance `index` and sizes its capture buffer for the configured
    /// resolution.
    ///
    /// # Panics
    ///
    /// If a [`SlotView`] from an earlier capture of `index` is still alive.
    /// The check runs before memuc is invoked.
    pub fn start_vm(&self, index: usize) -> Result<()> {
        self.check_handle(index);
        self.pool.assert_idle(index);
        self.run_checked(&MemucCommand::Start { index })?;
        self.pool.prepare(index, self.config.vm.max_image_bytes());
        info!("vm {index} started");
        Ok(())
    }

    /// Shuts instance `index` down. Its capture buffer is released only once
    /// memuc confirms the stop.
    ///
    /// # Panics
    ///
    /// Like [`Memuc::start_vm`], if a capture view of `index` is still alive.
    pub fn stop_vm(&self, index: usize) -> Result<()> {
        self.check_handle(index);
        self.pool.assert_idle(index);
        self.run_checked(&MemucCommand::Stop { index })?;
        self.pool.release(index);
        info!("vm {index} stopped");
        Ok(())
    }

    pub fn reboot_vm(&self, index: usize) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::Reboot { index })?;
        info!("vm {index} rebooting");
        Ok(())
    }

    pub fn start_app(&self, index: usize, package: &str) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::StartApp { index, package })?;
        Ok(())
    }

    pub fn stop_app(&self, index: usize, package: &str) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::StopApp { index, package })?;
        Ok(())
    }

    pub fn trigger_key(&self, index: usize, key: KeyCode) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::KeyEvent { index, key })?;
        Ok(())
    }

    pub fn trigger_swipe(
        &self,
        index: usize,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u32,
    ) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::Swipe {
            index,
            from,
            to,
            duration_ms,
        })?;
        Ok(())
    }

    pub fn trigger_click(&self, index: usize, at: (u32, u32)) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::Tap { index, at })?;
        Ok(())
    }

    /// Zooms in for a positive `factor`, out otherwise.
    pub fn trigger_zoom(&self, index: usize, factor: i32) -> Result<()> {
        self.check_handle(index);
        let command = if factor > 0 {
            MemucCommand::ZoomIn { index }
        } else {
            MemucCommand::ZoomOut { index }
        };
        self.run_checked(&command)?;
        Ok(())
    }

    pub fn set_config(&self, index: usize, key: &str, value: impl Display) -> Result<()> {
        self.check_handle(index);
        self.run_checked(&MemucCommand::SetConfig {
            index,
            key,
            value: value.to_string(),
        })?;
        Ok(())
    }

    /// Pushes a custom resolution and DPI. Takes effect on the next boot.
    pub fn apply_vm_config(&self, index: usize, vm: &VmConfig) -> Result<()> {
        self.set_config(index, "is_customed_resolution", 1)?;
        self.set_config(index, "resolution_width", vm.width)?;
        self.set_config(index, "resolution_height", vm.height)?;
        self.set_config(index, "vbox_dpi", vm.dpi)?;
        info!(
            "vm {index} configured for {}x{} @ {} dpi",
            vm.width, vm.height, vm.dpi
        );
        Ok(())
    }

    pub fn list_processes(&self, index: usize) -> Result<Vec<ProcessRecord>> {
        self.check_handle(index);
        let raw = self.invoke(&MemucCommand::ListProcesses { index })?;
        let response = response::frame(&raw, Sentinel::Connected)?;
        let records = listing::parse_processes(&response::decode_text(response.payload));
        debug!(index, count = records.len(), "listed processes");
        Ok(records)
    }

    /// Captures the screen of instance `index` as a 24-bit BMP.
    ///
    /// The returned view points into the instance's pooled buffer and holds
    /// it locked; the next capture of the same instance waits until the view
    /// is dropped and then overwrites it.
    pub fn screen_cap(&self, index: usize) -> Result<SlotView<'_>> {
        self.check_handle(index);
        let raw = self.invoke(&MemucCommand::ScreenCap { index })?;
        let response = response::frame(&raw, Sentinel::Connected)?;

        let normalized;
        let payload = if self.config.normalize_crlf {
            let mut owned = response.payload.to_vec();
            framebuffer::normalize_line_endings(&mut owned);
            normalized = owned;
            normalized.as_slice()
        } else {
            response.payload
        };

        let frame = framebuffer::decode(payload)?;
        let mut slot = self.pool.acquire(index);
        let written = bitmap::encode_frame(&frame, &mut slot)?;
        debug!(
            index,
            width = frame.header.width,
            height = frame.header.height,
            pixel_format = frame.header.pixel_format,
            bytes = written,
            "screen captured"
        );
        Ok(SlotView::new(slot, written))
    }

    fn check_handle(&self, index: usize) {
        assert!(
            index < self.pool.capacity(),
            "instance handle {index} out of range (pool holds {} slots)",
            self.pool.capacity()
        );
    }

    fn invoke(&self, command: &MemucCommand<'_>) -> Result<Vec<u8>> {
        let invocation = Invocation {
            program: self.config.memuc_path.clone(),
            args: command.args(),
        };
        Ok(invocation.run(self.launcher.as_ref())?)
    }

    fn run_checked(&self, command: &MemucCommand<'_>) -> Result<()> {
        let raw = self.invoke(command)?;
        if let Some(sentinel) = command.sentinel() {
            response::frame(&raw, sentinel)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        panic::AssertUnwindSafe,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::error::{Error, LaunchFailure};
    use crate::pool::SlotState;
    use crate::response::PREAMBLE_LEN;

    /// Replays canned stdout in order and records every argv it was given.
    struct ScriptedLauncher {
        replies: Mutex<VecDeque<Option<Vec<u8>>>>,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Launcher for ScriptedLauncher {
        fn run(&self, program: &Path, args: &[String]) -> std::result::Result<Vec<u8>, LaunchFailure> {
            self.calls.lock().unwrap().push(args.to_vec());
            match self.replies.lock().unwrap().pop_front().flatten() {
                Some(stdout) => Ok(stdout),
                None => Err(LaunchFailure::NotFound(program.display().to_string())),
            }
        }
    }

    struct Harness {
        memuc: Memuc,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Harness {
        fn new(config: MemucConfig, replies: Vec<Option<Vec<u8>>>) -> Self {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let launcher = ScriptedLauncher {
                replies: Mutex::new(replies.into()),
                calls: Arc::clone(&calls),
            };
            Self {
                memuc: Memuc::with_launcher(config, Box::new(launcher)),
                calls,
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn test_config() -> MemucConfig {
        MemucConfig {
            memuc_path: PathBuf::from("memuc.exe"),
            max_instances: 4,
            normalize_crlf: false,
            vm: VmConfig {
                width: 2,
                height: 2,
                dpi: 160,
            },
        }
    }

    fn status(text: &str) -> Vec<u8> {
        let mut raw = text.as_bytes().to_vec();
        raw.resize(PREAMBLE_LEN, b' ');
        raw
    }

    fn capture_output(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
        let mut raw = status("already connected to 127.0.0.1:21503");
        raw.extend_from_slice(&width.to_le_bytes());
        raw.extend_from_slice(&height.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(pixels);
        raw
    }

    #[test]
    fn list_vms_parses_whole_output() {
        let h = Harness::new(
            test_config(),
            vec![Some(b"0,MEmu,0,1,1234\r\n1,MEmu_1,0,0,0\r\n".to_vec())],
        );
        let vms = h.memuc.list_vms().unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].name, "MEmu");
        assert!(vms[0].enabled);
        assert!(!vms[1].enabled);
        assert_eq!(h.calls(), vec![vec!["listvms".to_string()]]);
    }

    #[test]
    fn start_prepares_slot_for_configured_resolution() {
        let h = Harness::new(test_config(), vec![Some(b"SUCCESS: start vm finished.".to_vec())]);
        h.memuc.start_vm(1).unwrap();

        assert_eq!(h.memuc.pool().state(1), SlotState::Started);
        assert_eq!(
            h.memuc.pool().acquire(1).len(),
            bitmap::encoded_len(2, 2).unwrap() as usize
        );
        assert_eq!(h.calls(), vec![vec!["start", "-i", "1"]]);
    }

    #[test]
    fn failed_start_leaves_slot_stopped() {
        let h = Harness::new(test_config(), vec![Some(b"ERROR: vm not exist".to_vec())]);
        let err = h.memuc.start_vm(0).unwrap_err();
        assert!(err.is_not_connected());
        assert_eq!(h.memuc.pool().state(0), SlotState::Stopped);
    }

    #[test]
    fn stop_releases_slot_only_on_success() {
        let h = Harness::new(
            test_config(),
            vec![
                Some(b"SUCCESS: start vm finished.".to_vec()),
                Some(b"ERROR: stop failed".to_vec()),
                Some(b"SUCCESS: stop vm finished.".to_vec()),
            ],
        );
        h.memuc.start_vm(2).unwrap();

        assert!(h.memuc.stop_vm(2).unwrap_err().is_not_connected());
        assert_eq!(h.memuc.pool().state(2), SlotState::Started);

        h.memuc.stop_vm(2).unwrap();
        assert_eq!(h.memuc.pool().state(2), SlotState::Stopped);
    }

    #[test]
    fn launch_failure_surfaces() {
        let h = Harness::new(test_config(), vec![None]);
        let err = h.memuc.reboot_vm(0).unwrap_err();
        assert!(matches!(err, Error::Launch(LaunchFailure::NotFound(_))));
    }

    #[test]
    fn input_commands_need_connected_preamble() {
        let h = Harness::new(
            test_config(),
            vec![
                Some(status("already connected to 127.0.0.1:21503")),
                Some(status("SUCCESS")),
            ],
        );
        h.memuc.trigger_click(0, (100, 200)).unwrap();
        assert!(h.memuc.trigger_key(0, KeyCode::Home).is_err());
        assert_eq!(
            h.calls()[0],
            vec!["-i", "0", "adb", "shell", "input", "tap", "100", "200"]
        );
    }

    #[test]
    fn zoom_direction_follows_factor_sign() {
        let ok = || Some(b"SUCCESS".to_vec());
        let h = Harness::new(test_config(), vec![ok(), ok(), ok()]);
        h.memuc.trigger_zoom(0, 2).unwrap();
        h.memuc.trigger_zoom(0, 0).unwrap();
        h.memuc.trigger_zoom(0, -1).unwrap();
        let verbs: Vec<String> = h.calls().into_iter().map(|c| c[0].clone()).collect();
        assert_eq!(verbs, vec!["zoomin", "zoomout", "zoomout"]);
    }

    #[test]
    fn apply_vm_config_sets_resolution_and_dpi() {
        let ok = || Some(b"SUCCESS".to_vec());
        let h = Harness::new(test_config(), vec![ok(), ok(), ok(), ok()]);
        h.memuc
            .apply_vm_config(
                3,
                &VmConfig {
                    width: 1080,
                    height: 1920,
                    dpi: 480,
                },
            )
            .unwrap();
        let pairs: Vec<(String, String)> = h
            .calls()
            .into_iter()
            .map(|c| (c[3].clone(), c[4].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("is_customed_resolution".into(), "1".into()),
                ("resolution_width".into(), "1080".into()),
                ("resolution_height".into(), "1920".into()),
                ("vbox_dpi".into(), "480".into()),
            ]
        );
    }

    #[test]
    fn list_processes_reads_past_preamble() {
        let mut raw = status("already connected to 127.0.0.1:21503");
        raw.extend_from_slice(
            b"USER PID NAME\nsystem 1 com.android.systemui\nu0_a1 2 com.example.app\nu0_a2 3 com.android.phone\n",
        );
        let h = Harness::new(test_config(), vec![Some(raw)]);
        let procs = h.memuc.list_processes(0).unwrap();
        assert_eq!(procs, vec![ProcessRecord { name: "com.example.app".into() }]);
    }

    #[test]
    fn screen_cap_encodes_into_pool_slot() {
        let pixels: [u8; 16] = [
            1, 2, 3, 255, 4, 5, 6, 255, //
            7, 8, 9, 255, 10, 11, 12, 255,
        ];
        let h = Harness::new(test_config(), vec![Some(capture_output(2, 2, &pixels))]);

        let view = h.memuc.screen_cap(0).unwrap();
        assert_eq!(view.len(), 54 + 8 * 2);
        assert_eq!(&view[..2], b"BM");
        assert_eq!(&view[54..62], &[9, 8, 7, 12, 11, 10, 0, 0]);
        assert_eq!(&view[62..70], &[3, 2, 1, 6, 5, 4, 0, 0]);
    }

    #[test]
    fn screen_cap_without_connection_is_not_connected() {
        let mut raw = status("error: device not found");
        raw.extend_from_slice(&capture_output(1, 1, &[0, 0, 0, 0])[PREAMBLE_LEN..]);
        let h = Harness::new(test_config(), vec![Some(raw)]);
        assert!(h.memuc.screen_cap(0).unwrap_err().is_not_connected());
    }

    #[test]
    fn oversized_frame_overflows_and_keeps_previous_image() {
        let h = Harness::new(
            test_config(),
            vec![
                Some(capture_output(1, 1, &[10, 20, 30, 255])),
                Some(capture_output(4, 4, &[0xFF; 64])),
            ],
        );
        let first = h.memuc.screen_cap(0).unwrap().to_vec();

        let err = h.memuc.screen_cap(0).unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { .. }));

        let slot = h.memuc.pool().acquire(0);
        assert_eq!(&slot[..first.len()], first.as_slice());
    }

    #[test]
    fn stop_with_live_view_panics_before_invoking_memuc() {
        let h = Harness::new(
            test_config(),
            vec![
                Some(capture_output(1, 1, &[10, 20, 30, 255])),
                Some(b"SUCCESS: stop vm finished.".to_vec()),
            ],
        );
        let view = h.memuc.screen_cap(0).unwrap();

        let stop = std::panic::catch_unwind(AssertUnwindSafe(|| h.memuc.stop_vm(0)));
        let message = stop.unwrap_err();
        let message = message.downcast_ref::<String>().unwrap();
        assert_eq!(message, "capture view for instance 0 still alive");
        assert_eq!(h.calls().len(), 1);

        drop(view);
        h.memuc.stop_vm(0).unwrap();
        assert_eq!(h.memuc.pool().state(0), SlotState::Stopped);
    }

    #[test]
    #[should_panic(expected = "still alive")]
    fn start_with_live_view_panics() {
        let h = Harness::new(
            test_config(),
            vec![Some(capture_output(1, 1, &[10, 20, 30, 255]))],
        );
        let _view = h.memuc.screen_cap(1).unwrap();
        let _ = h.memuc.start_vm(1);
    }

    #[test]
    fn truncated_capture_is_reported() {
        let h = Harness::new(test_config(), vec![Some(capture_output(2, 2, &[0; 10]))]);
        assert!(matches!(
            h.memuc.screen_cap(0).unwrap_err(),
            Error::TruncatedPayload { .. }
        ));
    }

    #[test]
    fn crlf_normalization_applies_to_payload_only() {
        let mut config = test_config();
        config.normalize_crlf = true;
        // A pixel whose red channel is LF arrives with an injected CR.
        let mut raw = capture_output(1, 1, &[]);
        raw.extend_from_slice(&[b'\r', b'\n', 20, 30, 255]);
        let h = Harness::new(config, vec![Some(raw)]);

        let view = h.memuc.screen_cap(0).unwrap();
        assert_eq!(&view[54..57], &[30, 20, b'\n']);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_handle_panics() {
        let h = Harness::new(test_config(), vec![]);
        let _ = h.memuc.start_app(4, "com.example.app");
    }
}
