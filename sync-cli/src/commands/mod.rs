//! CLI command implementations.

pub mod check_config;
pub mod inspect;
pub mod migrate;

use anyhow::Result;
use notesync_client::QueueMirror;
use notesync_types::AccountId;
use std::path::PathBuf;

/// Which mirror file a command works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorTarget {
    /// An account's mirror inside a data directory.
    Account {
        /// The data directory.
        data_dir: PathBuf,
        /// The account.
        account: AccountId,
    },
    /// An explicit file.
    File(PathBuf),
}

impl MirrorTarget {
    /// Pick the target from command-line arguments.
    pub fn resolve(
        data_dir: Option<PathBuf>,
        account: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<Self> {
        match (account, file) {
            (_, Some(file)) => Ok(MirrorTarget::File(file)),
            (Some(account), None) => {
                let data_dir = match data_dir {
                    Some(dir) => dir,
                    None => crate::default_data_dir()?,
                };
                Ok(MirrorTarget::Account {
                    data_dir,
                    account: AccountId::new(account),
                })
            }
            (None, None) => anyhow::bail!("Must specify --account or --file"),
        }
    }

    /// The mirror at this target.
    pub fn mirror(&self) -> QueueMirror {
        match self {
            MirrorTarget::Account { data_dir, account } => {
                QueueMirror::for_account(data_dir, account)
            }
            MirrorTarget::File(path) => QueueMirror::new(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn account_mirror_lives_in_data_dir() {
        let target = MirrorTarget::resolve(
            Some(PathBuf::from("/data")),
            Some("user@example.com".into()),
            None,
        )
        .unwrap();

        assert!(target.mirror().path().starts_with(Path::new("/data")));
    }

    #[test]
    fn explicit_file_wins() {
        let target =
            MirrorTarget::resolve(None, None, Some(PathBuf::from("/tmp/q.json"))).unwrap();
        assert_eq!(target.mirror().path(), Path::new("/tmp/q.json"));
    }

    #[test]
    fn target_is_required() {
        assert!(MirrorTarget::resolve(None, None, None).is_err());
    }
}
