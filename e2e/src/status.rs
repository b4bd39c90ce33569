use crate::command::CapturedOutput;
use crate::constants::PHASE_COMPLETED;
use crate::error::{self, Result};
use log::trace;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use std::fmt::{Display, Formatter};

/// The phase reported in the status of a Velero backup or restore. Phases are only ever compared,
/// never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phase(String);

impl Phase {
    pub fn new<S: Into<String>>(phase: S) -> Self {
        Self(phase.into())
    }

    pub fn completed() -> Self {
        Self::new(PHASE_COMPLETED)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for Phase {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The only part of a `get -o json` document we care about.
#[derive(Debug, Default, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    status: Status,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    phase: Phase,
}

/// Decodes the phase out of a status document. A document without a status or phase has an empty
/// phase.
pub fn decode_phase(json: &[u8]) -> Result<Phase> {
    let document: StatusDocument =
        serde_json::from_slice(json).context(error::MalformedOutputSnafu)?;
    trace!("Decoded phase '{}'", document.status.phase);
    Ok(document.status.phase)
}

/// Decodes `output` and requires its phase to equal `expected`. `kind` and `name` identify the
/// object in the error message.
pub fn check_phase(
    output: &CapturedOutput,
    kind: &str,
    name: &str,
    expected: &Phase,
) -> Result<()> {
    let observed = decode_phase(output.as_bytes())?;
    ensure!(
        &observed == expected,
        error::PhaseMismatchSnafu {
            kind,
            name,
            observed,
            expected: expected.clone(),
        }
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    fn output(s: &str) -> CapturedOutput {
        CapturedOutput::from(s.as_bytes().to_vec())
    }

    #[test]
    fn matching_phase() {
        check_phase(
            &output(r#"{"status":{"phase":"Completed"}}"#),
            "backup",
            "b1",
            &Phase::completed(),
        )
        .unwrap();
    }

    #[test]
    fn mismatched_phase_reports_both_values() {
        let err = check_phase(
            &output(r#"{"status":{"phase":"Failed"}}"#),
            "backup",
            "b1",
            &Phase::completed(),
        )
        .unwrap_err();
        match &err {
            Error::PhaseMismatch {
                observed, expected, ..
            } => {
                assert_eq!(observed.as_str(), "Failed");
                assert_eq!(expected.as_str(), "Completed");
            }
            other => panic!("unexpected error: {}", other),
        }
        let message = err.to_string();
        assert!(message.contains("Failed"));
        assert!(message.contains("Completed"));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let phase = decode_phase(
            br#"{"kind":"Restore","metadata":{"name":"r1"},"spec":{"backupName":"b1"},
                "status":{"phase":"InProgress","warnings":3}}"#,
        )
        .unwrap();
        assert_eq!(phase, Phase::from("InProgress"));
    }

    #[test]
    fn missing_status_is_an_empty_phase() {
        assert_eq!(decode_phase(b"{}").unwrap(), Phase::default());
        let err = check_phase(&output("{}"), "restore", "r1", &Phase::completed()).unwrap_err();
        assert!(matches!(err, Error::PhaseMismatch { .. }));
    }

    #[test]
    fn undecodable_output_is_malformed() {
        for bad in ["", "not json", r#"{"status":{"phase":"Comp"#, r#"{"status":"Completed"}"#] {
            let err = check_phase(&output(bad), "backup", "b1", &Phase::completed()).unwrap_err();
            assert!(
                matches!(err, Error::MalformedOutput { .. }),
                "'{}' gave {}",
                bad,
                err
            );
        }
    }
}
