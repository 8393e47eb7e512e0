//! Folder driver: run the external CellViT detection script once per subdirectory.
//!
//! Every immediate subdirectory of the data folder is handed to the script as
//! `--patch_path`, with the same-named subdirectory of the output folder as
//! `--save_path`. Failing folders are collected and written to a report file;
//! a failure never stops the run.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CellvitError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 2;
pub const DEFAULT_SCRIPT_PATH: &str =
    "/home/KutumLabGPU/Documents/oralcancer/CellViT/cell_segmentation/inference/cell_detection.py";
pub const DEFAULT_MODEL: &str = "./CellViT-SAM-H-x40.pth";
pub const DEFAULT_PYTHON: &str = "python3";
pub const REPORT_FILE: &str = "error_paths.txt";

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub data_folder: PathBuf,
    pub out_folder: PathBuf,
    pub batch_size: usize,
    pub script_path: PathBuf,
    pub model: PathBuf,
    pub gpu: u32,
    pub python: PathBuf,
    pub report_path: PathBuf,
}

impl DriverConfig {
    pub fn new(data_folder: impl Into<PathBuf>, out_folder: impl Into<PathBuf>) -> Self {
        Self {
            data_folder: data_folder.into(),
            out_folder: out_folder.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            script_path: PathBuf::from(DEFAULT_SCRIPT_PATH),
            model: PathBuf::from(DEFAULT_MODEL),
            gpu: 0,
            python: PathBuf::from(DEFAULT_PYTHON),
            report_path: PathBuf::from(REPORT_FILE),
        }
    }

    /// Command for one folder: `<python> <script> --model .. --gpu .. --batch_size ..
    /// process_patches --patch_path <input> --save_path <output>`.
    pub fn invocation(&self, folder: impl AsRef<Path>) -> Invocation {
        let folder = folder.as_ref();
        let input = self.data_folder.join(folder);
        let output = self.out_folder.join(folder);
        let args: Vec<OsString> = vec![
            self.script_path.clone().into(),
            "--model".into(),
            self.model.clone().into(),
            "--gpu".into(),
            self.gpu.to_string().into(),
            "--batch_size".into(),
            self.batch_size.to_string().into(),
            "process_patches".into(),
            "--patch_path".into(),
            input.clone().into(),
            "--save_path".into(),
            output.clone().into(),
        ];
        Invocation {
            program: self.python.clone().into(),
            args,
            input,
            output,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Result of one external run. `code` is None when the process could not be
/// started or was killed by a signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutcome {
    pub code: Option<i32>,
    pub output: Option<CapturedOutput>,
}

impl TaskOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            output: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Blocking execution of one invocation.
pub trait TaskRunner {
    fn run(&mut self, invocation: &Invocation) -> TaskOutcome;
}

/// Runs invocations as child processes and waits for them. No timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    capture: bool,
}

impl ProcessRunner {
    /// Inherit stdout/stderr from the driver.
    pub fn new() -> Self {
        Self { capture: false }
    }

    /// Collect stdout/stderr into the outcome instead of passing them through.
    pub fn capturing() -> Self {
        Self { capture: true }
    }
}

impl TaskRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> TaskOutcome {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if self.capture {
            match cmd.output() {
                Ok(out) => TaskOutcome {
                    code: out.status.code(),
                    output: Some(CapturedOutput {
                        stdout: out.stdout,
                        stderr: out.stderr,
                    }),
                },
                Err(e) => {
                    tracing::warn!("failed to start {:?}: {}", invocation.program, e);
                    TaskOutcome::default()
                }
            }
        } else {
            match cmd.status() {
                Ok(status) => TaskOutcome {
                    code: status.code(),
                    output: None,
                },
                Err(e) => {
                    tracing::warn!("failed to start {:?}: {}", invocation.program, e);
                    TaskOutcome::default()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverReport {
    pub invoked: usize,
    pub failed: Vec<PathBuf>,
}

impl DriverReport {
    fn merge(&mut self, other: DriverReport) {
        self.invoked += other.invoked;
        self.failed.extend(other.failed);
    }
}

/// Names of the immediate subdirectories of `root`, sorted. Names need not be UTF-8.
pub fn list_subdirs(root: &Path) -> Result<Vec<OsString>> {
    let entries = fs::read_dir(root).map_err(|e| CellvitError::io(root, e))?;
    let mut dirs: Vec<OsString> = entries
        .filter_map(|e| {
            let e = e.ok()?;
            e.path().is_dir().then(|| e.file_name())
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Run every folder without writing the report.
pub fn process_folders(
    config: &DriverConfig,
    runner: &mut impl TaskRunner,
    progress: &impl Fn(f64, &str),
) -> Result<DriverReport> {
    let folders = list_subdirs(&config.data_folder)?;
    let total = folders.len();
    let mut report = DriverReport::default();

    for (i, folder) in folders.iter().enumerate() {
        let invocation = config.invocation(folder);
        tracing::debug!("running {}", invocation.command_line());
        let outcome = runner.run(&invocation);
        report.invoked += 1;

        if !outcome.success() {
            match outcome.code {
                Some(code) => tracing::warn!(
                    "command failed with exit code {} for {}; recording path",
                    code,
                    invocation.input.display()
                ),
                None => tracing::warn!(
                    "command did not exit normally for {}; recording path",
                    invocation.input.display()
                ),
            }
            report.failed.push(invocation.input);
        }

        progress(
            (i + 1) as f64 / total as f64,
            &format!("Processed folder {}/{}", i + 1, total),
        );
    }
    Ok(report)
}

/// Run every folder, then overwrite the report file with the failed input paths.
pub fn run_folders(
    config: &DriverConfig,
    runner: &mut impl TaskRunner,
    progress: impl Fn(f64, &str),
) -> Result<DriverReport> {
    let report = process_folders(config, runner, &progress)?;
    write_report(&config.report_path, &report.failed)?;
    progress(
        1.0,
        &format!(
            "{} of {} folder(s) failed, wrote {}",
            report.failed.len(),
            report.invoked,
            config.report_path.display()
        ),
    );
    Ok(report)
}

pub fn write_report(path: &Path, failed: &[PathBuf]) -> Result<()> {
    let mut text = String::new();
    for p in failed {
        text.push_str(&p.to_string_lossy());
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| CellvitError::io(path, e))
}

pub const DEFAULT_SPLITS: [&str; 3] = ["train", "validation", "test"];
pub const DEFAULT_CLASSES: [&str; 5] = ["NORMAL", "OSMF", "OSCC/WD", "OSCC/MD", "OSCC/PD"];

/// Grid of `<root>/<split>/<class>` folders, each processed in place.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub root: PathBuf,
    pub splits: Vec<String>,
    pub classes: Vec<String>,
}

impl SweepConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            splits: DEFAULT_SPLITS.iter().map(|s| s.to_string()).collect(),
            classes: DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Folders in visiting order: splits outer, classes inner.
    pub fn folders(&self) -> Vec<PathBuf> {
        self.splits
            .iter()
            .flat_map(|s| self.classes.iter().map(move |c| self.root.join(s).join(c)))
            .collect()
    }
}

/// Run the driver over every sweep folder (data and output in the same place)
/// and write one combined report to `template.report_path`.
pub fn run_sweep(
    sweep: &SweepConfig,
    template: &DriverConfig,
    runner: &mut impl TaskRunner,
    progress: impl Fn(f64, &str),
) -> Result<DriverReport> {
    let folders = sweep.folders();
    let total = folders.len();
    let mut report = DriverReport::default();

    for (i, folder) in folders.into_iter().enumerate() {
        if !folder.is_dir() {
            tracing::warn!("{} is not a directory; recording path", folder.display());
            report.failed.push(folder);
            continue;
        }
        tracing::info!("sweep {}/{}: {}", i + 1, total, folder.display());
        let config = DriverConfig {
            data_folder: folder.clone(),
            out_folder: folder,
            ..template.clone()
        };
        let base = i as f64 / total as f64;
        let part = process_folders(&config, runner, &|p: f64, msg: &str| {
            progress(base + p / total as f64, msg)
        })?;
        report.merge(part);
    }

    write_report(&template.report_path, &report.failed)?;
    progress(
        1.0,
        &format!(
            "{} failure(s) across {} folder(s), wrote {}",
            report.failed.len(),
            total,
            template.report_path.display()
        ),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records invocations; exits non-zero for inputs ending in one of `fail`.
    struct MockRunner {
        calls: Vec<Invocation>,
        fail: Vec<&'static str>,
    }

    impl MockRunner {
        fn failing(fail: Vec<&'static str>) -> Self {
            Self {
                calls: Vec::new(),
                fail,
            }
        }
    }

    impl TaskRunner for MockRunner {
        fn run(&mut self, invocation: &Invocation) -> TaskOutcome {
            self.calls.push(invocation.clone());
            if self.fail.iter().any(|f| invocation.input.ends_with(f)) {
                TaskOutcome::exited(1)
            } else {
                TaskOutcome::exited(0)
            }
        }
    }

    fn no_progress(_: f64, _: &str) {}

    fn config_in(tmp: &Path) -> DriverConfig {
        let mut config = DriverConfig::new(tmp.join("data"), tmp.join("out"));
        config.report_path = tmp.join(REPORT_FILE);
        config
    }

    #[test]
    fn failing_folder_is_reported_and_others_still_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        for d in ["C", "A", "B"] {
            fs::create_dir_all(config.data_folder.join(d)).unwrap();
        }
        fs::write(config.data_folder.join("readme.txt"), "not a folder").unwrap();
        fs::write(&config.report_path, "stale\n").unwrap();

        let mut runner = MockRunner::failing(vec!["B"]);
        let report = run_folders(&config, &mut runner, no_progress).unwrap();

        let inputs: Vec<PathBuf> = runner.calls.iter().map(|c| c.input.clone()).collect();
        assert_eq!(
            inputs,
            vec![
                config.data_folder.join("A"),
                config.data_folder.join("B"),
                config.data_folder.join("C"),
            ]
        );
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failed, vec![config.data_folder.join("B")]);

        let written = fs::read_to_string(&config.report_path).unwrap();
        assert_eq!(
            written,
            format!("{}\n", config.data_folder.join("B").display())
        );
    }

    #[test]
    fn empty_root_writes_empty_report_without_invoking() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        fs::create_dir_all(&config.data_folder).unwrap();

        let mut runner = MockRunner::failing(vec![]);
        let report = run_folders(&config, &mut runner, no_progress).unwrap();

        assert!(runner.calls.is_empty());
        assert_eq!(report, DriverReport::default());
        assert_eq!(fs::read_to_string(&config.report_path).unwrap(), "");
    }

    #[test]
    fn invocation_has_expected_shape() {
        let mut config = DriverConfig::new("/data", "/out");
        config.batch_size = 8;
        config.script_path = PathBuf::from("detect.py");
        let inv = config.invocation("slide_1");
        assert_eq!(
            inv.command_line(),
            "python3 detect.py --model ./CellViT-SAM-H-x40.pth --gpu 0 --batch_size 8 \
             process_patches --patch_path /data/slide_1 --save_path /out/slide_1"
        );
        assert_eq!(inv.output, PathBuf::from("/out/slide_1"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_folder_names_are_still_run() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let odd = OsStr::from_bytes(b"slide_\xff");
        fs::create_dir_all(config.data_folder.join("A")).unwrap();
        fs::create_dir_all(config.data_folder.join(odd)).unwrap();

        let listed = list_subdirs(&config.data_folder).unwrap();
        assert_eq!(listed, vec![OsString::from("A"), odd.to_os_string()]);

        let mut runner = MockRunner::failing(vec![]);
        let report = run_folders(&config, &mut runner, no_progress).unwrap();
        assert_eq!(report.invoked, 2);
        assert_eq!(runner.calls[1].input, config.data_folder.join(odd));
        assert_eq!(runner.calls[1].output, config.out_folder.join(odd));
    }

    #[test]
    fn missing_data_folder_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let mut runner = MockRunner::failing(vec![]);
        assert!(matches!(
            run_folders(&config, &mut runner, no_progress),
            Err(CellvitError::Io { .. })
        ));
        assert!(!config.report_path.exists());
    }

    #[test]
    fn sweep_visits_grid_in_place_and_writes_one_report() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("split_data");
        let mut sweep = SweepConfig::new(&root);
        sweep.splits = vec!["train".into(), "test".into()];
        sweep.classes = vec!["NORMAL".into(), "OSCC/WD".into()];
        fs::create_dir_all(root.join("train/NORMAL/p1")).unwrap();
        fs::create_dir_all(root.join("train/OSCC/WD/p2")).unwrap();
        fs::create_dir_all(root.join("test/NORMAL/p3")).unwrap();

        let template = config_in(tmp.path());
        let mut runner = MockRunner::failing(vec!["p2"]);
        let report = run_sweep(&sweep, &template, &mut runner, no_progress).unwrap();

        let calls: Vec<(PathBuf, PathBuf)> = runner
            .calls
            .iter()
            .map(|c| (c.input.clone(), c.output.clone()))
            .collect();
        assert_eq!(
            calls,
            vec![
                (root.join("train/NORMAL/p1"), root.join("train/NORMAL/p1")),
                (root.join("train/OSCC/WD/p2"), root.join("train/OSCC/WD/p2")),
                (root.join("test/NORMAL/p3"), root.join("test/NORMAL/p3")),
            ]
        );
        assert_eq!(
            report.failed,
            vec![root.join("train/OSCC/WD/p2"), root.join("test/OSCC/WD")]
        );
        let lines = fs::read_to_string(&template.report_path).unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_reports_exit_status() {
        let inv = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "echo hi; exit 3".into()],
            input: PathBuf::from("in"),
            output: PathBuf::from("out"),
        };
        let outcome = ProcessRunner::capturing().run(&inv);
        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success());
        assert_eq!(outcome.output.unwrap().stdout, b"hi\n");

        let missing = Invocation {
            program: "/nonexistent/cellvit-python".into(),
            ..inv
        };
        assert_eq!(ProcessRunner::new().run(&missing), TaskOutcome::default());
    }
}
