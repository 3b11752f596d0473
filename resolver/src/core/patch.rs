//! Micro-grammar for interactive specification patches.

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchCommand {
    /// `runtime==X`: force a runtime version.
    ForceRuntime(String),
    /// `pkg==ver`: pin a package.
    Pin { name: String, version: String },
    /// `del pkg`: remove a package.
    Remove(String),
    /// `q` / `quit`: abort the whole program.
    Quit,
}

/// Parse one line of operator input.
///
/// Commands are comma-separated. Empty input means retry unchanged (no
/// commands); unrecognized tokens are ignored rather than rejected.
pub fn parse_patch(input: &str) -> Vec<PatchCommand> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }
    if matches!(input.to_ascii_lowercase().as_str(), "q" | "quit") {
        return vec![PatchCommand::Quit];
    }

    let mut commands = Vec::new();
    for raw in input.split(',') {
        let token = raw.trim();
        if let Some(version) = token.strip_prefix("runtime==") {
            if !version.is_empty() {
                commands.push(PatchCommand::ForceRuntime(version.to_string()));
            }
        } else if let Some(name) = token.strip_prefix("del ") {
            let name = name.trim();
            if !name.is_empty() {
                commands.push(PatchCommand::Remove(name.to_string()));
            }
        } else if let Some((name, version)) = token.split_once("==") {
            let (name, version) = (name.trim(), version.trim());
            if !name.is_empty() && !version.is_empty() {
                commands.push(PatchCommand::Pin {
                    name: name.to_string(),
                    version: version.to_string(),
                });
            }
        }
        // unknown spellings are ignored
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_means_retry_unchanged() {
        assert!(parse_patch("").is_empty());
        assert!(parse_patch("   ").is_empty());
    }

    #[test]
    fn quit_aliases() {
        assert_eq!(parse_patch("q"), vec![PatchCommand::Quit]);
        assert_eq!(parse_patch("QUIT"), vec![PatchCommand::Quit]);
    }

    #[test]
    fn parses_each_command_form() {
        assert_eq!(
            parse_patch("runtime==3.7"),
            vec![PatchCommand::ForceRuntime("3.7".to_string())]
        );
        assert_eq!(
            parse_patch("pillow==8.4.0"),
            vec![PatchCommand::Pin {
                name: "pillow".to_string(),
                version: "8.4.0".to_string(),
            }]
        );
        assert_eq!(
            parse_patch("del getopt"),
            vec![PatchCommand::Remove("getopt".to_string())]
        );
    }

    #[test]
    fn comma_separated_commands_apply_in_order() {
        let commands = parse_patch("runtime==2.7, del sys, requests==2.31.0");
        assert_eq!(
            commands,
            vec![
                PatchCommand::ForceRuntime("2.7".to_string()),
                PatchCommand::Remove("sys".to_string()),
                PatchCommand::Pin {
                    name: "requests".to_string(),
                    version: "2.31.0".to_string(),
                },
            ]
        );
    }

    #[test]
    fn unknown_tokens_are_ignored_not_rejected() {
        let commands = parse_patch("help me, requests==2.0.0, ???");
        assert_eq!(
            commands,
            vec![PatchCommand::Pin {
                name: "requests".to_string(),
                version: "2.0.0".to_string(),
            }]
        );
    }
}
