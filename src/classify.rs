//! Cheap, string-only classification of a `java` invocation.
//!
//! Rules are data: each [`SignatureRule`] pairs a [`Pattern`] with the verdict
//! it yields, and rules are evaluated in a fixed order where the first match
//! wins. New launcher signatures are added by extending the rule table.

/// Reserved tokens that open the login/settings prompt.
pub const SETTINGS_MARKERS: &[&str] = &["--yggpro", "--yggproconfig"];
/// Reserved token that turns on debug logging.
pub const DEBUG_MARKER: &str = "--yggprodebug";
/// Prefix of a JVM argument file (`java @file`).
pub const ARGFILE_PREFIX: char = '@';

/// The vanilla client entry point, used to re-enter the game behind a wrapper.
pub const MINECRAFT_MAIN: &str = "net.minecraft.client.main.Main";

/// Launcher bootstrap entry points that only reveal the real command after running.
pub const KNOWN_WRAPPERS: &[&str] = &[
    "org.prismlauncher.EntryPoint",
    "org.multimc.EntryPoint",
    "org.polymc.EntryPoint",
];

/// Main classes that mark a real game launch.
pub const KNOWN_GAME_MAINS: &[&str] = &[
    MINECRAFT_MAIN,
    "net.minecraft.launchwrapper.Launch",
    "net.fabricmc.loader.impl.launch.knot.KnotClient",
    "net.fabricmc.loader.launch.knot.KnotClient",
    "org.quiltmc.loader.impl.launch.knot.KnotClient",
    "cpw.mods.bootstraplauncher.BootstrapLauncher",
    "cpw.mods.modlauncher.Launcher",
    "net.minecraftforge.bootstrap.ForgeBootstrap",
    "io.github.zekerzhayard.forgewrapper.installer.Main",
];

/// Flags a launcher passes when it only wants to learn about the runtime.
pub const PROBE_FLAGS: &[&str] = &[
    "-version",
    "--version",
    "-showversion",
    "--show-version",
    "-fullversion",
    "--full-version",
    "-help",
    "--help",
    "-h",
    "-?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchVerdict {
    /// Empty invocation or pure version/help flags.
    VersionProbe,
    SettingsRequest,
    PassThrough,
    WrapperLaunch,
    StandardLaunch,
}

impl LaunchVerdict {
    pub fn is_launch(self) -> bool {
        matches!(self, LaunchVerdict::WrapperLaunch | LaunchVerdict::StandardLaunch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// A whole argument equals the literal.
    Exact(String),
    /// An argument starts with the literal.
    Prefix(String),
    /// The space-joined argument line contains the literal.
    Contains(String),
}

impl Pattern {
    pub fn literal(&self) -> &str {
        match self {
            Pattern::Exact(lit) | Pattern::Prefix(lit) | Pattern::Contains(lit) => lit,
        }
    }

    fn matches(&self, args: &[String], joined: &str) -> bool {
        match self {
            Pattern::Exact(lit) => args.iter().any(|a| a == lit),
            Pattern::Prefix(lit) => args.iter().any(|a| a.starts_with(lit.as_str())),
            Pattern::Contains(lit) => joined.contains(lit.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRule {
    pub pattern: Pattern,
    pub verdict: LaunchVerdict,
}

impl SignatureRule {
    fn new(pattern: Pattern, verdict: LaunchVerdict) -> Self {
        Self { pattern, verdict }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchClassifier {
    settings_rules: Vec<SignatureRule>,
    launch_rules: Vec<SignatureRule>,
    probe_flags: Vec<String>,
}

impl Default for LaunchClassifier {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

impl LaunchClassifier {
    /// Builds the rule table, adding user-configured signatures after the built-in ones.
    pub fn new(extra_wrappers: &[String], extra_main_classes: &[String]) -> Self {
        let settings_rules = SETTINGS_MARKERS
            .iter()
            .map(|m| SignatureRule::new(Pattern::Exact(m.to_string()), LaunchVerdict::SettingsRequest))
            .collect();

        let mut launch_rules = Vec::new();
        for wrapper in KNOWN_WRAPPERS.iter().map(|s| s.to_string()).chain(extra_wrappers.iter().cloned()) {
            launch_rules.push(SignatureRule::new(Pattern::Contains(wrapper), LaunchVerdict::WrapperLaunch));
        }
        launch_rules.push(SignatureRule::new(
            Pattern::Prefix(ARGFILE_PREFIX.to_string()),
            LaunchVerdict::StandardLaunch,
        ));
        for main in KNOWN_GAME_MAINS.iter().map(|s| s.to_string()).chain(extra_main_classes.iter().cloned()) {
            launch_rules.push(SignatureRule::new(Pattern::Contains(main), LaunchVerdict::StandardLaunch));
        }

        Self {
            settings_rules,
            launch_rules,
            probe_flags: PROBE_FLAGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn classify(&self, args: &[String]) -> LaunchVerdict {
        let joined = args.join(" ");

        if self.settings_rules.iter().any(|r| r.pattern.matches(args, &joined)) {
            return LaunchVerdict::SettingsRequest;
        }

        if args.is_empty() {
            return LaunchVerdict::VersionProbe;
        }

        let launch = self
            .launch_rules
            .iter()
            .find(|r| r.pattern.matches(args, &joined))
            .map(|r| r.verdict);

        if launch.is_none() && args.iter().any(|a| self.probe_flags.contains(a)) {
            return LaunchVerdict::VersionProbe;
        }

        launch.unwrap_or(LaunchVerdict::PassThrough)
    }

    /// Index of the first argument carrying a wrapper signature.
    pub fn wrapper_position(&self, args: &[String]) -> Option<usize> {
        let wrappers: Vec<&str> = self
            .launch_rules
            .iter()
            .filter(|r| r.verdict == LaunchVerdict::WrapperLaunch)
            .map(|r| r.pattern.literal())
            .collect();
        args.iter().position(|a| wrappers.iter().any(|w| a.contains(w)))
    }

    /// Whether `arg` is exactly one of the known game main classes.
    pub fn is_game_main(&self, arg: &str) -> bool {
        self.launch_rules.iter().any(|r| {
            r.verdict == LaunchVerdict::StandardLaunch
                && matches!(&r.pattern, Pattern::Contains(lit) if lit == arg)
        })
    }
}

pub fn is_settings_marker(arg: &str) -> bool {
    SETTINGS_MARKERS.contains(&arg)
}

pub fn is_marker(arg: &str) -> bool {
    is_settings_marker(arg) || arg == DEBUG_MARKER
}

/// Removes every reserved marker, returning the cleaned list and whether a
/// settings marker was among them.
pub fn strip_markers(args: &[String]) -> (Vec<String>, bool) {
    let settings = args.iter().any(|a| is_settings_marker(a));
    let cleaned = args.iter().filter(|a| !is_marker(a)).cloned().collect();
    (cleaned, settings)
}
