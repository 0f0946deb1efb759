use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use crate::auth::{AuthClient, YggdrasilClient};
use crate::classify::{
    is_marker, strip_markers, LaunchClassifier, LaunchVerdict, ARGFILE_PREFIX, DEBUG_MARKER, MINECRAFT_MAIN,
};
use crate::java::JavaLocator;
use crate::launch::{launch, spawn_and_wait, LaunchMode};
use crate::login::{ConsoleLogin, LoginOutcome, LoginPrompt, LoginReason, LoginRequest};
use crate::platform::bundled_assets_dir;
use crate::rewrite::{redact_args, FinalCommand, Rewriter};
use crate::runtime::{RuntimeArtifacts, RuntimeProvisioner};
use crate::session::SessionResolver;
use crate::settings::SettingsManager;
use crate::sniff::{SniffStrategy, Sniffer};
use crate::store::{AccountStore, FileAccountStore};
use crate::utils::{normalize_path, APP_NAME};
use crate::Result;

const SETTINGS_FILE: &str = "settings.toml";
const ACCOUNTS_FILE: &str = "accounts.json";
const RUNTIME_DIR: &str = "runtime";

/// One invocation of the stand-in `java`: classify, resolve, rewrite, launch.
pub struct App {
    settings: SettingsManager,
    store: Box<dyn AccountStore>,
    client: Arc<dyn AuthClient>,
    login: Box<dyn LoginPrompt>,
    provisioner: RuntimeProvisioner,
    locator: JavaLocator,
    launch_mode: LaunchMode,
}

impl App {
    pub fn new(
        settings: SettingsManager,
        store: Box<dyn AccountStore>,
        client: Arc<dyn AuthClient>,
        login: Box<dyn LoginPrompt>,
        data_dir: &Path,
    ) -> Self {
        let check_timeout = Duration::from_secs(settings.get().java_check_timeout_secs.max(1));
        let assets_dir = settings
            .get()
            .assets_dir
            .clone()
            .or_else(bundled_assets_dir)
            .unwrap_or_else(|| PathBuf::from("assets"));

        Self {
            provisioner: RuntimeProvisioner::new(assets_dir, data_dir.join(RUNTIME_DIR), check_timeout),
            locator: JavaLocator::new(data_dir, check_timeout),
            settings,
            store,
            client,
            login,
            launch_mode: LaunchMode::native(),
        }
    }

    /// File-backed collaborators under `data_dir` and the terminal login.
    pub fn from_data_dir(data_dir: &Path) -> Result<Self> {
        let settings = SettingsManager::new(data_dir.join(SETTINGS_FILE))?;
        if let Err(e) = settings.validate() {
            log::warn!("Settings look wrong: {}", e);
        }
        let store = FileAccountStore::new_with_file(data_dir.join(ACCOUNTS_FILE));
        let client: Arc<dyn AuthClient> = Arc::new(YggdrasilClient::new()?);
        let login = ConsoleLogin::new(client.clone());

        Ok(Self::new(settings, Box::new(store), client, Box::new(login), data_dir))
    }

    pub fn with_launch_mode(mut self, mode: LaunchMode) -> Self {
        self.launch_mode = mode;
        self
    }

    /// Runs one invocation and returns the process exit code. With
    /// [`LaunchMode::Replace`] a successful launch does not return at all.
    pub async fn run<I, S>(&mut self, raw_args: I) -> i32
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let raw_os: Vec<OsString> = raw_args.into_iter().map(Into::into).collect();
        let forwarded = forwarded_args(&raw_os);
        let raw_args: Vec<String> = raw_os.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        if raw_args.iter().any(|a| a == DEBUG_MARKER) {
            log::debug!("Raw arguments:");
            for (i, arg) in redact_args(&raw_args).iter().enumerate() {
                log::debug!("  argv[{}] = {}", i, arg);
            }
        }

        let classifier = {
            let settings = self.settings.get();
            LaunchClassifier::new(&settings.extra_wrappers, &settings.extra_main_classes)
        };
        let (args, _) = strip_markers(&raw_args);

        // Markers never reach a real Java, so the rest of the run works on `args`.
        let settings_requested = classifier.classify(&raw_args) == LaunchVerdict::SettingsRequest;
        let verdict = classifier.classify(&args);
        if settings_requested && !verdict.is_launch() {
            return self.run_settings().await;
        }
        let force_interactive = settings_requested;
        log::debug!("Verdict: {:?}", verdict);

        match verdict {
            LaunchVerdict::VersionProbe if args.is_empty() => {
                let Some(java) = self.pass_through_java().await else {
                    return 1;
                };
                // Shows the real runtime's usage; the outcome does not matter to the caller.
                if let Err(e) = spawn_and_wait(&FinalCommand::new(java, Vec::<OsString>::new())) {
                    log::error!("{}", e);
                }
                0
            }
            LaunchVerdict::VersionProbe | LaunchVerdict::PassThrough | LaunchVerdict::SettingsRequest => {
                let Some(java) = self.pass_through_java().await else {
                    return 1;
                };
                self.hand_off(FinalCommand::new(java, forwarded))
            }
            LaunchVerdict::WrapperLaunch | LaunchVerdict::StandardLaunch => {
                self.run_launch(&classifier, verdict, args, forwarded, force_interactive).await
            }
        }
    }

    async fn run_launch(
        &mut self,
        classifier: &LaunchClassifier,
        verdict: LaunchVerdict,
        args: Vec<String>,
        forwarded: Vec<OsString>,
        force_interactive: bool,
    ) -> i32 {
        let artifacts = self.provisioner.ensure_artifacts().await;
        let target = self.target_java().await;
        let Some(sniff_java) = artifacts.java.clone().or_else(|| target.clone()) else {
            eprintln!("[{}] No usable Java found.", APP_NAME);
            return 1;
        };

        let sniffed = needs_sniff(verdict, &args);
        let resolved = if sniffed {
            match self.sniff_args(classifier, verdict, &args, &artifacts, &sniff_java).await {
                Some(resolved) => resolved,
                None => {
                    log::warn!("Could not resolve launch arguments, starting the game unmodified");
                    let java = target.unwrap_or(sniff_java);
                    return self.hand_off(FinalCommand::new(java, forwarded));
                }
            }
        } else {
            args
        };

        let (resolved, hidden_settings) = strip_markers(&resolved);
        let force_interactive = force_interactive || hidden_settings;

        let game_dir = game_dir_from(&resolved);
        let launch_java = self
            .settings
            .get()
            .java_for_instance(&game_dir)
            .filter(|p| p.is_file())
            .cloned()
            .or(target)
            .unwrap_or(sniff_java);

        let Some(agent_jar) = artifacts.agent_jar.clone() else {
            log::warn!("Auth agent missing, launching without credential injection");
            let command = if sniffed {
                FinalCommand::new(launch_java, resolved)
            } else {
                FinalCommand::new(launch_java, forwarded)
            };
            return self.hand_off(command);
        };

        let api = self.settings.get().current_api();
        let account = {
            let mut resolver =
                SessionResolver::new(&mut *self.store, &*self.client, &mut *self.login, api.clone());
            resolver.resolve(&game_dir, force_interactive).await
        };
        let Some(account) = account else {
            eprintln!("[{}] No usable account, launch aborted.", APP_NAME);
            return 1;
        };

        let rewriter = Rewriter::new(classifier.clone(), agent_jar, self.settings.get().version_label.clone());
        let command = rewriter.rewrite(launch_java, &resolved, &account, &api);

        log::info!("Launching as {}", account.display_name);
        log::debug!("Final command: {}", command);
        self.hand_off(command)
    }

    /// The real argument list hidden behind a wrapper or argfile, or `None`
    /// to fall back to an unmodified launch.
    async fn sniff_args(
        &self,
        classifier: &LaunchClassifier,
        verdict: LaunchVerdict,
        args: &[String],
        artifacts: &RuntimeArtifacts,
        sniff_java: &Path,
    ) -> Option<Vec<String>> {
        let sniffer_jar = artifacts.sniffer_jar.clone()?;
        let timeout = Duration::from_secs(self.settings.get().sniff_timeout_secs.max(1));
        let sniffer = Sniffer::new(sniffer_jar, timeout);

        match verdict {
            LaunchVerdict::WrapperLaunch => {
                let sniffed = sniffer.sniff(SniffStrategy::Wrapper, sniff_java, args).await?;
                Some(reconstruct_wrapper_launch(classifier, args, sniffed))
            }
            _ => sniffer.sniff(SniffStrategy::Standard, sniff_java, args).await,
        }
    }

    /// Configured Java if still present, else discovery (persisted on success).
    async fn target_java(&mut self) -> Option<PathBuf> {
        let configured = self.settings.get().real_java_path.clone();
        let found = self.locator.locate(configured.as_deref()).await?;
        self.settings.set_real_java_path(found.clone());
        if self.settings.is_dirty() {
            log::info!("Using {} as the real Java", found.display());
            if let Err(e) = self.settings.save() {
                log::warn!("Failed to save settings: {}", e);
            }
        }
        Some(found)
    }

    /// Target Java, provisioning the fallback only when there is none.
    async fn pass_through_java(&mut self) -> Option<PathBuf> {
        if let Some(java) = self.target_java().await {
            return Some(java);
        }
        match self.provisioner.ensure_artifacts().await.require_java() {
            Ok(java) => Some(java.to_path_buf()),
            Err(e) => {
                eprintln!("[{}] No usable Java found: {}", APP_NAME, e);
                None
            }
        }
    }

    async fn run_settings(&mut self) -> i32 {
        let game_dir = normalize_path(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let api = self.settings.get().current_api();
        let previous = self
            .store
            .default_account()
            .and_then(|id| self.store.get_account(&id));
        let request = LoginRequest {
            game_dir: &game_dir,
            api: &api,
            reason: LoginReason::Requested,
            previous: previous.as_ref(),
        };

        match self.login.prompt(&mut *self.store, &request).await {
            Ok(LoginOutcome::Completed) => 0,
            Ok(LoginOutcome::Cancelled) => 1,
            Err(e) => {
                eprintln!("[{}] Login failed: {}", APP_NAME, e);
                1
            }
        }
    }

    fn hand_off(&self, command: FinalCommand) -> i32 {
        match launch(&command, self.launch_mode) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("[{}] {}", APP_NAME, e);
                1
            }
        }
    }
}

/// The invocation minus markers, untouched otherwise.
fn forwarded_args(raw: &[OsString]) -> Vec<OsString> {
    raw.iter()
        .filter(|a| !a.to_str().is_some_and(is_marker))
        .cloned()
        .collect()
}

fn needs_sniff(verdict: LaunchVerdict, args: &[String]) -> bool {
    verdict == LaunchVerdict::WrapperLaunch || args.iter().any(|a| a.starts_with(ARGFILE_PREFIX))
}

/// `--gameDir <dir>` or `--gameDir=<dir>`, else the working directory; normalized.
pub fn game_dir_from(args: &[String]) -> PathBuf {
    let mut found = None;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--gameDir" {
            if let Some(dir) = args.get(i + 1) {
                found = Some(PathBuf::from(dir));
                break;
            }
        } else if let Some(dir) = arg.strip_prefix("--gameDir=") {
            found = Some(PathBuf::from(dir));
            break;
        }
    }
    let dir = found
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    normalize_path(&dir)
}

/// A wrapper's sniffed output is either the complete command (it names a game
/// main class) or just the game arguments, to be run behind the JVM arguments
/// that preceded the wrapper class.
pub fn reconstruct_wrapper_launch(classifier: &LaunchClassifier, raw: &[String], sniffed: Vec<String>) -> Vec<String> {
    if sniffed.iter().any(|a| classifier.is_game_main(a)) {
        return sniffed;
    }
    let prefix_len = classifier.wrapper_position(raw).unwrap_or(0);
    let mut resolved = Vec::with_capacity(prefix_len + 1 + sniffed.len());
    resolved.extend_from_slice(&raw[..prefix_len]);
    resolved.push(MINECRAFT_MAIN.to_string());
    resolved.extend(sniffed);
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Account, MockAuthClient};
    use crate::runtime::{AGENT_JAR_NAME, SNIFFER_JAR_NAME};
    use crate::store::MemoryAccountStore;
    use std::cell::Cell;
    use std::rc::Rc;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_game_dir_forms() {
        let dir = tempfile::tempdir().unwrap();
        let base = normalize_path(dir.path());
        let text = base.join("A").to_string_lossy().to_string();

        assert_eq!(game_dir_from(&args(&["--gameDir", &text])), base.join("A"));
        assert_eq!(game_dir_from(&args(&[&format!("--gameDir={}", text)])), base.join("A"));
        let cwd = normalize_path(&std::env::current_dir().unwrap());
        assert_eq!(game_dir_from(&args(&["--username", "x", "--gameDir"])), cwd);
    }

    #[test]
    fn test_wrapper_reconstruction() {
        let classifier = LaunchClassifier::default();
        let raw = args(&["-Xmx2G", "-cp", "NewLaunch.jar", "org.prismlauncher.EntryPoint"]);

        let resolved = reconstruct_wrapper_launch(&classifier, &raw, args(&["--gameDir", "/i/A"]));
        assert_eq!(
            resolved,
            args(&["-Xmx2G", "-cp", "NewLaunch.jar", MINECRAFT_MAIN, "--gameDir", "/i/A"])
        );

        let complete = args(&["-cp", "mc.jar", MINECRAFT_MAIN, "--gameDir", "/i/A"]);
        assert_eq!(reconstruct_wrapper_launch(&classifier, &raw, complete.clone()), complete);
    }

    /// Login stand-in that only counts how often it was opened.
    struct CountingLogin(Rc<Cell<usize>>);

    #[async_trait::async_trait(?Send)]
    impl LoginPrompt for CountingLogin {
        async fn prompt(&mut self, _store: &mut dyn AccountStore, _request: &LoginRequest<'_>) -> Result<LoginOutcome> {
            self.0.set(self.0.get() + 1);
            Ok(LoginOutcome::Cancelled)
        }
    }

    fn account() -> Account {
        Account {
            id: "8f2a".to_string(),
            display_name: "Alex".to_string(),
            access_token: "live-token".to_string(),
            client_token: None,
            origin: "Test".to_string(),
            login: None,
            profile_bound: true,
            invalid: false,
            last_used: None,
        }
    }

    #[cfg(unix)]
    struct Fixture {
        dir: tempfile::TempDir,
        java: PathBuf,
        record: PathBuf,
    }

    #[cfg(unix)]
    impl Fixture {
        /// A fake `java` that records its arguments and exits with 7; when run
        /// with the sniffer on its classpath it hangs instead.
        fn new() -> Self {
            use std::os::unix::fs::PermissionsExt;
            let dir = tempfile::tempdir().unwrap();
            let record = dir.path().join("record.txt");
            let java = dir.path().join("java");
            std::fs::write(
                &java,
                format!(
                    "#!/bin/sh\ncase \"$*\" in *{}*) exec sleep 5;; esac\nfor a in \"$@\"; do echo \"$a\" >> '{}'; done\nexit 7\n",
                    SNIFFER_JAR_NAME,
                    record.display()
                ),
            )
            .unwrap();
            std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();

            let assets = dir.path().join("assets");
            std::fs::create_dir_all(&assets).unwrap();
            for name in [AGENT_JAR_NAME, SNIFFER_JAR_NAME] {
                let file = std::fs::File::create(assets.join(name)).unwrap();
                let mut zip = zip::ZipWriter::new(file);
                zip.start_file("A.class", zip::write::FileOptions::default()).unwrap();
                zip.finish().unwrap();
            }

            Self { dir, java, record }
        }

        fn app(&self, store: MemoryAccountStore, client: MockAuthClient, logins: Rc<Cell<usize>>) -> App {
            let data_dir = self.dir.path().join("data");
            let mut settings = SettingsManager::new(data_dir.join(SETTINGS_FILE)).unwrap();
            settings.get_mut().real_java_path = Some(self.java.clone());
            settings.get_mut().assets_dir = Some(self.dir.path().join("assets"));
            settings.get_mut().sniff_timeout_secs = 1;

            App::new(settings, Box::new(store), Arc::new(client), Box::new(CountingLogin(logins)), &data_dir)
                .with_launch_mode(LaunchMode::SpawnAndWait)
        }

        fn recorded(&self) -> Vec<String> {
            std::fs::read_to_string(&self.record)
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }

        fn recorded_bytes(&self) -> Vec<u8> {
            std::fs::read(&self.record).unwrap_or_default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_probe_passes_through_without_network() {
        let fixture = Fixture::new();
        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(MemoryAccountStore::new(), MockAuthClient::new(), logins.clone());

        let code = app.run(args(&["-version", "--yggprodebug"])).await;

        assert_eq!(code, 7);
        assert_eq!(fixture.recorded(), args(&["-version"]));
        assert_eq!(logins.get(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_standard_launch_injects_credentials() {
        let fixture = Fixture::new();
        let game_dir = normalize_path(fixture.dir.path()).join("instances").join("A");
        let mut store = MemoryAccountStore::new();
        store.add_or_update_account(account()).unwrap();
        store.set_default_account("8f2a").unwrap();

        let mut client = MockAuthClient::new();
        client.expect_validate().times(1).returning(|_, _, _| Ok(true));

        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(store.clone(), client, logins.clone());
        let game_dir_text = game_dir.to_string_lossy().to_string();
        let code = app
            .run(args(&[
                "-cp",
                "mc.jar",
                MINECRAFT_MAIN,
                "--gameDir",
                &game_dir_text,
                "--accessToken",
                "launcher-token",
            ]))
            .await;

        assert_eq!(code, 7);
        let recorded = fixture.recorded();
        assert!(recorded.iter().any(|a| a.starts_with("-javaagent:") && a.contains(AGENT_JAR_NAME)));
        assert!(recorded.contains(&"live-token".to_string()));
        assert!(!recorded.contains(&"launcher-token".to_string()));
        assert_eq!(store.get_account_for_instance(&game_dir).as_deref(), Some("8f2a"));
        assert_eq!(logins.get(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sniff_timeout_launches_raw_args() {
        let fixture = Fixture::new();
        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(MemoryAccountStore::new(), MockAuthClient::new(), logins.clone());
        let raw = args(&["-cp", "trap.jar", "org.prismlauncher.EntryPoint"]);

        let code = app.run(raw.clone()).await;

        assert_eq!(code, 7);
        assert_eq!(fixture.recorded(), raw);
        assert_eq!(logins.get(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pass_through_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStrExt;
        let fixture = Fixture::new();
        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(MemoryAccountStore::new(), MockAuthClient::new(), logins.clone());
        let path = std::ffi::OsStr::from_bytes(b"/g/\xff").to_os_string();

        let code = app.run(vec![path, OsString::from("--yggprodebug")]).await;

        assert_eq!(code, 7);
        assert_eq!(fixture.recorded_bytes(), b"/g/\xff\n".to_vec());
        assert_eq!(logins.get(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sniff_fallback_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStrExt;
        let fixture = Fixture::new();
        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(MemoryAccountStore::new(), MockAuthClient::new(), logins.clone());
        let property = std::ffi::OsStr::from_bytes(b"-Dgame.dir=/g/\xff").to_os_string();
        let raw = vec![
            property,
            OsString::from("-cp"),
            OsString::from("trap.jar"),
            OsString::from("org.prismlauncher.EntryPoint"),
        ];

        let code = app.run(raw).await;

        assert_eq!(code, 7);
        assert_eq!(
            fixture.recorded_bytes(),
            b"-Dgame.dir=/g/\xff\n-cp\ntrap.jar\norg.prismlauncher.EntryPoint\n".to_vec()
        );
        assert_eq!(logins.get(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_login_aborts_launch() {
        let fixture = Fixture::new();
        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(MemoryAccountStore::new(), MockAuthClient::new(), logins.clone());

        let code = app.run(args(&["-cp", "mc.jar", MINECRAFT_MAIN])).await;

        assert_eq!(code, 1);
        assert!(fixture.recorded().is_empty());
        assert_eq!(logins.get(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_settings_marker_alone_opens_login() {
        let fixture = Fixture::new();
        let logins = Rc::new(Cell::new(0));
        let mut app = fixture.app(MemoryAccountStore::new(), MockAuthClient::new(), logins.clone());

        assert_eq!(app.run(args(&["--yggpro"])).await, 1);
        assert_eq!(logins.get(), 1);
        assert!(fixture.recorded().is_empty());
    }
}
