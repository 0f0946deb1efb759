use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use crate::classify::MINECRAFT_MAIN;
use crate::platform::get_classpath_separator;
use crate::{Error, Result};

pub const SNIFF_START: &str = "---YGGPROXY_SNIFFER_START---";
pub const SNIFF_END: &str = "---YGGPROXY_SNIFFER_END---";

const CLASSPATH_FLAGS: &[&str] = &["-cp", "-classpath", "--class-path", "--cp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffStrategy {
    /// Shadow the wrapper's classpath with the helper so it dumps the real command.
    Wrapper,
    /// Run the helper as the main class over the invocation arguments.
    Standard,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    #[default]
    Waiting,
    Capturing,
    Done,
}

/// Line-oriented reader for the helper's dump: everything strictly between the
/// first start marker and the first end marker after it.
#[derive(Debug, Default)]
pub struct SentinelParser {
    state: ParserState,
    captured: Vec<String>,
}

impl SentinelParser {
    /// Feeds one line; returns `true` once the end marker has been seen.
    pub fn feed(&mut self, line: &str) -> bool {
        let line = line.trim();
        match self.state {
            ParserState::Waiting => {
                if line.contains(SNIFF_START) {
                    self.state = ParserState::Capturing;
                }
            }
            ParserState::Capturing => {
                if line.contains(SNIFF_END) {
                    self.state = ParserState::Done;
                } else {
                    // One line per argument; a blank line is an empty argument.
                    self.captured.push(line.to_string());
                }
            }
            ParserState::Done => {}
        }
        self.state == ParserState::Done
    }

    /// The captured arguments, or `None` for a missing marker or when nothing
    /// at all appeared between the markers.
    pub fn finish(self) -> Option<Vec<String>> {
        if self.state == ParserState::Done && !self.captured.is_empty() {
            Some(self.captured)
        } else {
            None
        }
    }
}

pub struct Sniffer {
    helper_jar: PathBuf,
    timeout: Duration,
}

impl Sniffer {
    pub fn new(helper_jar: PathBuf, timeout: Duration) -> Self {
        Self { helper_jar, timeout }
    }

    /// Runs the helper and returns the resolved argument list. Never fails:
    /// every problem is logged and reported as `None`.
    pub async fn sniff(&self, strategy: SniffStrategy, java: &Path, args: &[String]) -> Option<Vec<String>> {
        match self.try_sniff(strategy, java, args).await {
            Ok(resolved) => {
                log::debug!("Sniffed {} arguments", resolved.len());
                Some(resolved)
            }
            Err(e) => {
                log::warn!("Argument sniffing failed: {}", e);
                None
            }
        }
    }

    /// Arguments for the sniffing child process, not including the java binary.
    pub fn child_args(&self, strategy: SniffStrategy, args: &[String]) -> Result<Vec<String>> {
        let helper = self.helper_jar.to_string_lossy();
        match strategy {
            SniffStrategy::Wrapper => {
                let mut trap = args.to_vec();
                for i in 0..trap.len() {
                    if CLASSPATH_FLAGS.contains(&trap[i].as_str()) && i + 1 < trap.len() {
                        trap[i + 1] = format!("{}{}{}", helper, get_classpath_separator(), trap[i + 1]);
                        return Ok(trap);
                    }
                    if let Some(classpath) = trap[i].strip_prefix("--class-path=") {
                        trap[i] = format!("--class-path={}{}{}", helper, get_classpath_separator(), classpath);
                        return Ok(trap);
                    }
                }
                Err(Error::Sniff("no classpath argument to shadow".to_string()))
            }
            SniffStrategy::Standard => {
                let mut cmd = vec!["-cp".to_string(), helper.to_string(), MINECRAFT_MAIN.to_string()];
                cmd.extend(args.iter().cloned());
                Ok(cmd)
            }
        }
    }

    async fn try_sniff(&self, strategy: SniffStrategy, java: &Path, args: &[String]) -> Result<Vec<String>> {
        if !self.helper_jar.is_file() {
            return Err(Error::Sniff(format!("helper {} is missing", self.helper_jar.display())));
        }
        let child_args = self.child_args(strategy, args)?;

        log::debug!("Sniffing with {:?} strategy via {}", strategy, java.display());
        let mut child = Command::new(java)
            .args(&child_args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Sniff(format!("failed to start {}: {}", java.display(), e)))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let capture = async {
            let mut parser = SentinelParser::default();
            while let Some(line) = rx.recv().await {
                if parser.feed(&line) {
                    break;
                }
            }
            parser.finish()
        };

        let outcome = tokio::time::timeout(self.timeout, capture).await;
        if let Err(e) = child.kill().await {
            log::debug!("Sniffer child already gone: {}", e);
        }

        match outcome {
            Err(_) => Err(Error::Sniff(format!("timed out after {:?}", self.timeout))),
            Ok(None) => Err(Error::Sniff("no sentinel-delimited output".to_string())),
            Ok(Some(resolved)) => Ok(resolved),
        }
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}
