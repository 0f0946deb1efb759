use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use crate::auth::Account;
use crate::classify::{is_marker, LaunchClassifier};
use crate::settings::ApiEndpoint;

pub const AGENT_FLAG_PREFIX: &str = "-javaagent:";
pub const AGENT_PROPERTY_PREFIX: &str = "-Dauthlibinjector.";
pub const NO_SHOW_SERVER_NAME: &str = "-Dauthlibinjector.noShowServerName";
const AGENT_SIGNATURE: &str = "authlib-injector";

pub const ACCESS_TOKEN_FLAG: &str = "--accessToken";
/// Game flags carrying identity; the rewriter is their only source.
pub const SENSITIVE_FLAGS: &[&str] = &[
    "--username",
    "--uuid",
    ACCESS_TOKEN_FLAG,
    "--userProperties",
    "--versionType",
];

const REDACTED: &str = "***";

/// A ready-to-run command: the real Java and everything after it. Arguments
/// stay OS strings so pass-through launches forward them byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl FinalCommand {
    pub fn new<I, S>(program: PathBuf, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for FinalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        let shown: Vec<String> = self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        for arg in redact_args(&shown) {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Copies `args` with every access token replaced, for logging.
pub fn redact_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            out.push(REDACTED.to_string());
            hide_next = false;
        } else if arg == ACCESS_TOKEN_FLAG {
            out.push(arg.clone());
            hide_next = true;
        } else if arg.starts_with(&format!("{}=", ACCESS_TOKEN_FLAG)) {
            out.push(format!("{}={}", ACCESS_TOKEN_FLAG, REDACTED));
        } else {
            out.push(arg.clone());
        }
    }
    out
}

pub struct Rewriter {
    classifier: LaunchClassifier,
    agent_jar: PathBuf,
    version_label: String,
}

impl Rewriter {
    pub fn new(classifier: LaunchClassifier, agent_jar: PathBuf, version_label: String) -> Self {
        Self { classifier, agent_jar, version_label }
    }

    /// Builds the command that runs the game on `java` behind the agent with
    /// the given account. Rewriting its own arguments again yields the same list.
    pub fn rewrite(&self, java: PathBuf, resolved: &[String], account: &Account, api: &ApiEndpoint) -> FinalCommand {
        FinalCommand::new(java, self.rewrite_args(resolved, account, api))
    }

    fn rewrite_args(&self, resolved: &[String], account: &Account, api: &ApiEndpoint) -> Vec<String> {
        let cleaned: Vec<String> = resolved.iter().filter(|a| !is_marker(a)).cloned().collect();

        let mut out = Vec::with_capacity(cleaned.len() + 12);
        match cleaned.iter().position(|a| self.classifier.is_game_main(a)) {
            Some(split) => {
                out.extend(self.strip_agents(&cleaned[..split]));
                out.extend(self.agent_flags(api));
                out.push(cleaned[split].clone());
                out.extend(strip_sensitive(&cleaned[split + 1..]));
            }
            None => {
                log::debug!("No main class in resolved arguments, rewriting as a single pool");
                out.extend(self.agent_flags(api));
                out.extend(strip_sensitive(&self.strip_agents(&cleaned)));
            }
        }
        out.extend(self.identity_flags(account));
        out
    }

    fn agent_flags(&self, api: &ApiEndpoint) -> [String; 2] {
        [
            format!("{}{}={}", AGENT_FLAG_PREFIX, self.agent_jar.display(), api.base_url),
            NO_SHOW_SERVER_NAME.to_string(),
        ]
    }

    fn identity_flags(&self, account: &Account) -> Vec<String> {
        vec![
            "--username".to_string(),
            account.display_name.clone(),
            "--uuid".to_string(),
            account.id.clone(),
            ACCESS_TOKEN_FLAG.to_string(),
            account.access_token.clone(),
            "--userProperties".to_string(),
            "{}".to_string(),
            "--versionType".to_string(),
            self.version_label.clone(),
        ]
    }

    fn is_auth_agent(&self, arg: &str) -> bool {
        if arg.starts_with(AGENT_PROPERTY_PREFIX) {
            return true;
        }
        match arg.strip_prefix(AGENT_FLAG_PREFIX) {
            Some(agent) => {
                agent.contains(AGENT_SIGNATURE) || agent.contains(&*self.agent_jar.to_string_lossy())
            }
            None => false,
        }
    }

    fn strip_agents(&self, args: &[String]) -> Vec<String> {
        args.iter().filter(|a| !self.is_auth_agent(a)).cloned().collect()
    }
}

fn is_sensitive_pair(arg: &str) -> bool {
    SENSITIVE_FLAGS.contains(&arg)
}

fn is_sensitive_inline(arg: &str) -> bool {
    SENSITIVE_FLAGS
        .iter()
        .any(|flag| arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('=')))
}

/// Drops every identity flag, both `--flag value` and `--flag=value`. A value
/// that looks like another option is left in place.
fn strip_sensitive(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if is_sensitive_pair(arg) {
            if iter.peek().is_some_and(|next| !next.starts_with('-')) {
                iter.next();
            }
        } else if !is_sensitive_inline(arg) {
            out.push(arg.clone());
        }
    }
    out
}
