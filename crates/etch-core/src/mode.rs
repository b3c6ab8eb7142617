//! Run modes
//!
//! `DryRun` reports what would change without touching anything. `DampRun`
//! is a dry run that still executes `setup` commands, since those may be
//! needed to produce the originals the authority asks about.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Normal,
    DryRun,
    DampRun,
}

impl RunMode {
    /// Whether filesystem changes, archive and history writes happen.
    pub fn mutates(self) -> bool {
        self == Self::Normal
    }

    pub fn runs_setup(self) -> bool {
        matches!(self, Self::Normal | Self::DampRun)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::DryRun => "dry-run",
            Self::DampRun => "damp-run",
        })
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "dry-run" | "dryrun" => Ok(Self::DryRun),
            "damp-run" | "damprun" => Ok(Self::DampRun),
            other => Err(format!("unknown run mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RunMode::Normal, true, true)]
    #[case(RunMode::DryRun, false, false)]
    #[case(RunMode::DampRun, false, true)]
    fn mode_capabilities(#[case] mode: RunMode, #[case] mutates: bool, #[case] setup: bool) {
        assert_eq!(mode.mutates(), mutates);
        assert_eq!(mode.runs_setup(), setup);
        assert_eq!(mode.to_string().parse::<RunMode>().unwrap(), mode);
    }
}
