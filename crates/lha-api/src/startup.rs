//! Startup console output.
//!
//! Plain `println!` rather than `tracing`, so the operator sees where the
//! relay listens even with a JSON log pipeline attached.

use std::sync::OnceLock;

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_DIM: &str = "\x1b[2m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_BLUE: &str = "\x1b[34m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_GRAY: &str = "\x1b[90m";

/// Colors are on for a TTY on stderr unless `NO_COLOR` is set; `LHA_COLOR=true` forces them.
fn colors_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        if std::env::var("NO_COLOR").is_ok() {
            return false;
        }
        if std::env::var("LHA_COLOR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
        {
            return true;
        }
        atty::is(atty::Stream::Stderr)
    })
}

fn color(s: impl AsRef<str>, ansi: &str) -> String {
    if colors_enabled() {
        format!("{}{}{}", ansi, s.as_ref(), ANSI_RESET)
    } else {
        s.as_ref().to_string()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StartupPhase {
    Banner,
    Configuration,
    Transport,
    Ready,
}

/// Startup phase tracker.
pub struct StartupLogger {
    phase: StartupPhase,
    quiet: bool,
}

impl StartupLogger {
    pub fn new() -> Self {
        Self {
            phase: StartupPhase::Banner,
            quiet: false,
        }
    }

    /// No console output at all.
    pub fn quiet() -> Self {
        Self {
            phase: StartupPhase::Banner,
            quiet: true,
        }
    }

    pub fn banner(&mut self) {
        if self.quiet {
            return;
        }
        self.phase = StartupPhase::Banner;
        println!();
        println!(
            "{} {}",
            color("LHA relay", ANSI_BOLD),
            color(format!("v{}", env!("CARGO_PKG_VERSION")), ANSI_DIM)
        );
        println!();
    }

    fn enter(&mut self, phase: StartupPhase, title: &str) {
        if self.quiet || self.phase == phase {
            return;
        }
        println!(
            "{} {} {}",
            color("›", ANSI_BOLD),
            color(title, ANSI_BLUE),
            color("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━", ANSI_DIM)
        );
        self.phase = phase;
    }

    pub fn phase_config(&mut self) {
        self.enter(StartupPhase::Configuration, "Configuration");
    }

    pub fn phase_transport(&mut self) {
        self.enter(StartupPhase::Transport, "Transport");
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("  {} {}", color("●", ANSI_BLUE), message);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("  {} {}", color("✓", ANSI_GREEN), message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("  {} {}", color("⚠", ANSI_YELLOW), message);
        }
    }

    /// Indented, dim.
    pub fn detail(&self, message: &str) {
        if !self.quiet {
            println!("    {}", color(message, ANSI_GRAY));
        }
    }

    /// Listening addresses, then the stop hint.
    pub fn ready_info(&mut self, bind: &str, lan: Option<&str>) {
        if self.quiet {
            return;
        }
        self.phase = StartupPhase::Ready;
        println!();
        println!("{} {}", color("✓", ANSI_GREEN), color("Relay ready", ANSI_BOLD));
        println!(
            "  {} {}",
            color("Bound:", ANSI_BOLD),
            color(format!("http://{}", bind), ANSI_CYAN)
        );
        if let Some(lan) = lan {
            println!(
                "  {} {}",
                color("LAN:  ", ANSI_BOLD),
                color(format!("http://{}", lan), ANSI_CYAN)
            );
        }
        println!();
        println!("{} {}", color("Press", ANSI_BOLD), color("Ctrl+C to stop.", ANSI_DIM));
        println!();
    }
}

impl Default for StartupLogger {
    fn default() -> Self {
        Self::new()
    }
}
