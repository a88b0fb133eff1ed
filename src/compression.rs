use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::str::FromStr;
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::bgzf::BgzfDecoder;
use crate::filetype::FileType;
use crate::source::OpenSource;
use crate::utils::error::{BamError, ErrorKind};

/// External tools tried, in order, when no decompressor is forced
pub const EXTERNAL_TOOLS: [&str; 2] = ["pigz", "gzip"];

/// Which decompressor the caller asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decompressor {
    /// pigz, then gzip, then the internal decoder
    Auto,
    /// Always use the in-process bgzip decoder
    Internal,
    /// Prefer the `pigz` binary
    Pigz,
    /// Prefer the `gzip` binary
    Gzip,
    /// A shell command that writes the decompressed stream to stdout; `{}`
    /// is replaced by the input path (or `-` for piped input)
    Custom(String),
}

impl Default for Decompressor {
    fn default() -> Self {
        Decompressor::Auto
    }
}

impl FromStr for Decompressor {
    type Err = BamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "auto" => Decompressor::Auto,
            "internal" => Decompressor::Internal,
            "pigz" => Decompressor::Pigz,
            "gzip" => Decompressor::Gzip,
            cmd if cmd.contains("{}") => Decompressor::Custom(cmd.to_string()),
            cmd => {
                return Err(BamError::new(
                    ErrorKind::Config,
                    format!(
                        "decompressor {:?} is not auto, internal, pigz or gzip and has no {{}} for the input path",
                        cmd
                    ),
                ))
            }
        })
    }
}

impl fmt::Display for Decompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decompressor::Auto => write!(f, "auto"),
            Decompressor::Internal => write!(f, "internal"),
            Decompressor::Pigz => write!(f, "pigz"),
            Decompressor::Gzip => write!(f, "gzip"),
            Decompressor::Custom(cmd) => write!(f, "{}", cmd),
        }
    }
}

/// The decompressor actually in use for a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// The input was already raw BAM
    Uncompressed,
    Internal,
    Pigz,
    Gzip,
    Custom(String),
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Uncompressed => write!(f, "none"),
            Strategy::Internal => write!(f, "internal"),
            Strategy::Pigz => write!(f, "pigz"),
            Strategy::Gzip => write!(f, "gzip"),
            Strategy::Custom(cmd) => write!(f, "{}", cmd),
        }
    }
}

/// Check that `tool` can be run at all.
pub fn probe(tool: &str) -> bool {
    let found = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    debug!("probe for {}: {}", tool, if found { "found" } else { "missing" });
    found
}

/// Single-quote `s` for `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Stdout of a decompressor subprocess. The exit status is checked once
/// stdout runs dry and the child is killed if we're dropped early.
pub struct ProcessReader {
    child: Child,
    stdout: ChildStdout,
    /// Copies a piped (non-path) input into the child's stdin
    feeder: Option<JoinHandle<io::Result<()>>>,
    command: String,
    finished: bool,
}

impl ProcessReader {
    fn spawn(
        mut command: Command,
        label: String,
        input: Option<OpenSource>,
    ) -> Result<Self, BamError> {
        command
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = command.spawn().map_err(|e| {
            BamError::new(
                ErrorKind::Decompressor,
                format!("could not start `{}`: {}", label, e),
            )
        })?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BamError::new(
                    ErrorKind::Decompressor,
                    format!("`{}` has no stdout", label),
                ));
            }
        };
        let feeder = match (input, child.stdin.take()) {
            (Some(src), Some(mut stdin)) => Some(thread::spawn(move || -> io::Result<()> {
                stdin.write_all(&src.magic)?;
                let mut reader = src.reader;
                io::copy(&mut reader, &mut stdin)?;
                Ok(())
            })),
            _ => None,
        };
        debug!("spawned `{}` (pid {})", label, child.id());
        Ok(ProcessReader {
            child,
            stdout,
            feeder,
            command: label,
            finished: false,
        })
    }

    /// `tool --decompress --stdout`, on the path if there is one or on
    /// stdin otherwise.
    pub fn tool(tool: &str, src: OpenSource) -> Result<Self, BamError> {
        let mut command = Command::new(tool);
        command.arg("--decompress").arg("--stdout");
        match src.path.clone() {
            Some(path) => {
                command.arg(&path);
                Self::spawn(command, tool.to_string(), None)
            }
            None => Self::spawn(command, tool.to_string(), Some(src)),
        }
    }

    /// A user-supplied shell command run through `sh -c`.
    pub fn custom(cmd: &str, src: OpenSource) -> Result<Self, BamError> {
        let path = src
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let (line, input) = match path {
            Some(path) => (cmd.replace("{}", &shell_quote(&path)), None),
            None => (cmd.replace("{}", "-"), Some(src)),
        };
        let mut command = Command::new("sh");
        command.arg("-c").arg(&line);
        Self::spawn(command, cmd.to_string(), input)
    }

    fn finish(&mut self) -> Result<(), BamError> {
        self.finished = true;
        let status = self.child.wait()?;
        let fed = self.feeder.take().map(JoinHandle::join);
        debug!("`{}` finished with {}", self.command, status);
        if !status.success() {
            return Err(BamError::new(
                ErrorKind::Decompressor,
                format!("`{}` exited with {}", self.command, status),
            ));
        }
        match fed {
            Some(Ok(Err(e))) if e.kind() != io::ErrorKind::BrokenPipe => {
                Err(BamError::from(e).with_context(format!("feeding input to `{}`", self.command)))
            }
            Some(Err(_)) => Err(BamError::new(
                ErrorKind::Decompressor,
                format!("input thread for `{}` panicked", self.command),
            )),
            _ => Ok(()),
        }
    }
}

impl Read for ProcessReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let amt = self.stdout.read(buf)?;
        if amt == 0 {
            self.finish().map_err(BamError::into_io)?;
        }
        Ok(amt)
    }
}

impl Drop for ProcessReader {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        // the feeder thread ends on its own once the child's stdin closes
    }
}

impl fmt::Debug for ProcessReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessReader")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .field("finished", &self.finished)
            .finish()
    }
}

fn use_tool(tool: &str, src: OpenSource) -> Result<(Box<dyn Read + Send>, Strategy), BamError> {
    let strategy = match tool {
        "pigz" => Strategy::Pigz,
        _ => Strategy::Gzip,
    };
    Ok((Box::new(ProcessReader::tool(tool, src)?), strategy))
}

fn use_internal(src: OpenSource) -> (Box<dyn Read + Send>, Strategy) {
    (Box::new(BgzfDecoder::new(src.into_reader())), Strategy::Internal)
}

/// Decide how `src` is decompressed and return the decompressed stream.
///
/// # Errors
/// `UnrecognizedFormat` if the magic is neither BAM nor bgzip and no custom
/// command is configured; `Decompressor` if an external command can't start.
pub fn decompress(
    src: OpenSource,
    decompressor: &Decompressor,
) -> Result<(Box<dyn Read + Send>, Strategy), BamError> {
    let file_type = FileType::from_magic(&src.magic);
    let (stream, strategy) = match (file_type, decompressor) {
        (FileType::Bam, _) => (src.into_reader(), Strategy::Uncompressed),
        (_, Decompressor::Custom(cmd)) => (
            Box::new(ProcessReader::custom(cmd, src)?) as Box<dyn Read + Send>,
            Strategy::Custom(cmd.clone()),
        ),
        (FileType::Bgzf, Decompressor::Internal) => use_internal(src),
        (FileType::Bgzf, Decompressor::Auto) => {
            match EXTERNAL_TOOLS.iter().find(|tool| probe(tool)) {
                Some(tool) => use_tool(tool, src)?,
                None => use_internal(src),
            }
        }
        (FileType::Bgzf, forced) => {
            let tool = if *forced == Decompressor::Pigz {
                "pigz"
            } else {
                "gzip"
            };
            if probe(tool) {
                use_tool(tool, src)?
            } else {
                warn!("{} is not available; using the internal decompressor", tool);
                use_internal(src)
            }
        }
        _ => {
            return Err(BamError::new(
                ErrorKind::UnrecognizedFormat,
                format!(
                    "{} is not in a format I understand; first four bytes: {:?}",
                    src.name, src.magic
                ),
            ))
        }
    };
    debug!("decompressing with {}", strategy);
    Ok((stream, strategy))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::bgzf::test_helpers::bgzf_file;
    use crate::source::Source;

    fn open(data: Vec<u8>) -> Result<OpenSource, BamError> {
        Source::from_reader(Cursor::new(data)).open()
    }

    fn payload() -> Vec<u8> {
        let mut data = b"BAM\x01".to_vec();
        data.extend((0..5000).map(|i| (i % 97) as u8));
        data
    }

    #[test]
    fn test_parse_decompressor() -> Result<(), BamError> {
        assert_eq!("auto".parse::<Decompressor>()?, Decompressor::Auto);
        assert_eq!("internal".parse::<Decompressor>()?, Decompressor::Internal);
        assert_eq!("pigz".parse::<Decompressor>()?, Decompressor::Pigz);
        assert_eq!(
            "zcat {}".parse::<Decompressor>()?,
            Decompressor::Custom("zcat {}".to_string())
        );
        let err = "zcat".parse::<Decompressor>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        Ok(())
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::Uncompressed.to_string(), "none");
        assert_eq!(Strategy::Internal.to_string(), "internal");
        assert_eq!(Strategy::Custom("zcat {}".into()).to_string(), "zcat {}");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("a b.bam"), "'a b.bam'");
        assert_eq!(shell_quote("it's.bam"), r"'it'\''s.bam'");
    }

    #[test]
    fn test_uncompressed_passthrough() -> Result<(), BamError> {
        let (mut stream, strategy) = decompress(open(payload())?, &Decompressor::Auto)?;
        assert_eq!(strategy, Strategy::Uncompressed);
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        assert_eq!(out, payload());
        Ok(())
    }

    #[test]
    fn test_internal() -> Result<(), BamError> {
        let compressed = bgzf_file(&payload(), 1000);
        let (mut stream, strategy) = decompress(open(compressed)?, &Decompressor::Internal)?;
        assert_eq!(strategy, Strategy::Internal);
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        assert_eq!(out, payload());
        Ok(())
    }

    #[test]
    fn test_external_tools_match_internal() -> Result<(), BamError> {
        let compressed = bgzf_file(&payload(), 1000);
        for (tool, choice) in [("pigz", Decompressor::Pigz), ("gzip", Decompressor::Gzip)] {
            if !probe(tool) {
                continue;
            }
            let (mut stream, strategy) = decompress(open(compressed.clone())?, &choice)?;
            assert_eq!(strategy.to_string(), tool);
            let mut out = Vec::new();
            stream.read_to_end(&mut out)?;
            assert_eq!(out, payload());
        }
        Ok(())
    }

    #[test]
    fn test_unrecognized() {
        match decompress(open(b"ACGTACGT".to_vec()).unwrap(), &Decompressor::Auto) {
            Ok((_, strategy)) => panic!("plain text decompressed with {}", strategy),
            Err(err) => assert_eq!(err.kind, ErrorKind::UnrecognizedFormat),
        }
    }

    #[test]
    fn test_custom_on_piped_input() -> Result<(), BamError> {
        if !probe("cat") {
            return Ok(());
        }
        let custom = Decompressor::Custom("cat {}".to_string());
        let (mut stream, strategy) = decompress(open(b"ACGTACGT".to_vec())?, &custom)?;
        assert_eq!(strategy, Strategy::Custom("cat {}".to_string()));
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        assert_eq!(out, b"ACGTACGT");
        Ok(())
    }

    #[test]
    fn test_custom_failure_surfaces() -> Result<(), BamError> {
        let custom = Decompressor::Custom("false {}".to_string());
        let (mut stream, _) = decompress(open(b"ACGTACGT".to_vec())?, &custom)?;
        let mut out = Vec::new();
        let err: BamError = stream.read_to_end(&mut out).unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Decompressor);
        Ok(())
    }
}
