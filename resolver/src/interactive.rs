//! Interactive session: single candidate, operator-driven patches.
//!
//! The loop pauses at the correcting transition, prints a one-line diagnosis
//! synthesized by the suggestion service, and applies one line of operator
//! input in the patch micro-grammar. `q` aborts the whole program
//! immediately, bypassing normal log finalization.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::env_spec::EnvSpec;
use crate::core::patch::{PatchCommand, parse_patch};
use crate::exit_codes;
use crate::io::index::PackageIndex;
use crate::io::suggest::Suggester;

/// Hook invoked by the resolution loop after each failed attempt.
pub trait OperatorSession {
    fn pause(&mut self, log: &str, spec: &mut EnvSpec) -> Result<()>;
}

/// Operator session over arbitrary input/output streams (stdin/stdout in
/// production; buffers in tests).
pub struct ConsoleSession<'a, S, I, R, W> {
    suggester: &'a S,
    index: &'a I,
    input: R,
    output: W,
}

impl<'a, S, I, R, W> ConsoleSession<'a, S, I, R, W>
where
    S: Suggester,
    I: PackageIndex,
    R: BufRead,
    W: Write,
{
    pub fn new(suggester: &'a S, index: &'a I, input: R, output: W) -> Self {
        Self {
            suggester,
            index,
            input,
            output,
        }
    }

    fn apply_commands(&mut self, line: &str, spec: &mut EnvSpec) -> Result<()> {
        for command in parse_patch(line) {
            match command {
                PatchCommand::Quit => {
                    writeln!(self.output, "stopping on operator request")
                        .context("write farewell")?;
                    // Immediate abort of the whole program, not just the loop.
                    std::process::exit(exit_codes::OK);
                }
                PatchCommand::ForceRuntime(version) => {
                    debug!(%version, "operator forced runtime");
                    spec.runtime_version = version;
                }
                PatchCommand::Pin { name, version } => {
                    let name = self.index.canonicalize(&name)?;
                    spec.packages.pin(&name, Some(version));
                }
                PatchCommand::Remove(name) => {
                    let name = self.index.canonicalize(&name)?;
                    spec.packages.remove(&name);
                }
            }
        }
        Ok(())
    }
}

impl<S, I, R, W> OperatorSession for ConsoleSession<'_, S, I, R, W>
where
    S: Suggester,
    I: PackageIndex,
    R: BufRead,
    W: Write,
{
    fn pause(&mut self, log: &str, spec: &mut EnvSpec) -> Result<()> {
        let diagnosis = self
            .suggester
            .summarize_failure(log)
            .unwrap_or_else(|err| format!("(no diagnosis available: {err})"));
        writeln!(self.output, "\n{diagnosis}").context("write diagnosis")?;
        write!(
            self.output,
            "<Enter>=retry | runtime==x.y | pkg==ver | del pkg | q=quit > "
        )
        .context("write prompt")?;
        self.output.flush().context("flush prompt")?;

        let mut line = String::new();
        self.input.read_line(&mut line).context("read operator input")?;
        self.apply_commands(&line, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedSuggester, StaticIndex};

    fn session_roundtrip(input: &str, spec: &mut EnvSpec) -> String {
        let suggester = ScriptedSuggester::with_diagnosis("pin pillow to 8.4.0");
        let index = StaticIndex::default();
        let mut output = Vec::new();
        let mut session =
            ConsoleSession::new(&suggester, &index, input.as_bytes(), &mut output);
        session.pause("some log", spec).expect("pause");
        String::from_utf8(output).expect("utf8")
    }

    #[test]
    fn pause_prints_the_diagnosis_and_applies_pins() {
        let mut spec = EnvSpec::new("3.9");
        let transcript = session_roundtrip("PIL==8.4.0\n", &mut spec);

        assert!(transcript.contains("pin pillow to 8.4.0"));
        // Pins canonicalize: `PIL` lands as `pillow`.
        assert_eq!(
            spec.packages.get("pillow").expect("entry").version.as_deref(),
            Some("8.4.0")
        );
    }

    #[test]
    fn empty_input_retries_unchanged() {
        let mut spec = EnvSpec::new("3.9");
        spec.packages.pin("requests", None);
        session_roundtrip("\n", &mut spec);

        assert_eq!(spec.runtime_version, "3.9");
        assert!(spec.packages.contains("requests"));
    }

    #[test]
    fn runtime_and_removal_commands_mutate_the_spec() {
        let mut spec = EnvSpec::new("3.9");
        spec.packages.pin("requests", None);
        session_roundtrip("runtime==2.7, del requests\n", &mut spec);

        assert_eq!(spec.runtime_version, "2.7");
        assert!(spec.packages.is_empty());
    }
}
