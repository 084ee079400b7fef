//! Command-line argument parsing.
//!
//! Usage:
//!   brio [-i[<file>]] [-c<cmd>] [-snd] [<script>...]

use std::path::PathBuf;

use directories::ProjectDirs;

// ── Public types ──────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Init-script specification.
    pub init: InitScript,
    /// Statement to evaluate after init (`-c<cmd>`).
    pub command: Option<String>,
    /// Echo `=> value : type` after each statement (`-s`).
    pub show_results: bool,
    /// Keep the process alive after stdin EOF (`-n`).
    pub no_exit_on_eof: bool,
    /// Debug mode (`-d`).
    pub debug: bool,
    /// Script files to run instead of an interactive console.
    pub scripts: Vec<PathBuf>,
}

/// How to choose the init script.
#[derive(Debug, Default)]
pub enum InitScript {
    /// Search `~/.config/brio/init.brio`, then `./.briorc` (default).
    #[default]
    Search,
    /// `-i` with no file argument: skip the init script.
    Skip,
    /// `-i<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            args.scripts
                .extend(argv[i..].iter().map(PathBuf::from));
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            args.scripts.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                's' => args.show_results = true,
                'n' => args.no_exit_on_eof = true,
                'd' => args.debug = true,

                // -i[<file>]
                'i' => {
                    if j + 1 < chars.len() {
                        // Embedded: -i<file>
                        let file: String = chars[j + 1..].iter().collect();
                        args.init = InitScript::Explicit(PathBuf::from(file));
                        j = chars.len(); // consumed rest of this arg
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        // Separate: -i <file>
                        i += 1;
                        args.init = InitScript::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        // -i alone → skip the init script
                        args.init = InitScript::Skip;
                    }
                }

                // -c<cmd>
                'c' => {
                    let cmd = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a statement argument".to_owned());
                    };
                    args.command = Some(cmd);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────

/// Search for the user init script in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_init() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dirs) = ProjectDirs::from("", "", "brio") {
        candidates.push(dirs.config_dir().join("init.brio"));
    }
    candidates.push(PathBuf::from("./.briorc"));
    candidates.into_iter().find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(!a.show_results);
        assert!(!a.no_exit_on_eof);
        assert!(a.scripts.is_empty());
        assert!(matches!(a.init, InitScript::Search));
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-s", "-n", "-d"])).unwrap();
        assert!(a.show_results);
        assert!(a.no_exit_on_eof);
        assert!(a.debug);
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-snd"])).unwrap();
        assert!(a.show_results && a.no_exit_on_eof && a.debug);
    }

    #[test]
    fn init_skip() {
        let a = parse_argv(&argv(&["-i"])).unwrap();
        assert!(matches!(a.init, InitScript::Skip));
    }

    #[test]
    fn init_explicit_embedded() {
        let a = parse_argv(&argv(&["-imyrc.brio"])).unwrap();
        assert!(matches!(&a.init, InitScript::Explicit(p) if p == &PathBuf::from("myrc.brio")));
    }

    #[test]
    fn init_explicit_separate() {
        let a = parse_argv(&argv(&["-i", "myrc.brio"])).unwrap();
        assert!(matches!(&a.init, InitScript::Explicit(p) if p == &PathBuf::from("myrc.brio")));
    }

    #[test]
    fn command_embedded() {
        let a = parse_argv(&argv(&["-cprint(1)"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("print(1)"));
    }

    #[test]
    fn command_separate() {
        let a = parse_argv(&argv(&["-c", "1 + 1"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("1 + 1"));
    }

    #[test]
    fn command_missing_argument() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn positional_scripts() {
        let a = parse_argv(&argv(&["a.brio", "b.brio"])).unwrap();
        assert_eq!(
            a.scripts,
            vec![PathBuf::from("a.brio"), PathBuf::from("b.brio")]
        );
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-s"])).unwrap();
        assert!(!a.show_results);
        assert_eq!(a.scripts, vec![PathBuf::from("-s")]);
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
