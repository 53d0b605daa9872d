//! Recognized process options.

use crate::error::PrivilegeError;

use clap::Parser;
use tracing::info;

/// Command-line options the runtime recognizes.
///
/// Embed into a larger clap command with `#[command(flatten)]`, or parse
/// standalone with [`RuntimeOptions::from_args`]. Absent options mean no
/// privilege lowering.
#[derive(Debug, Clone, Default, Parser)]
pub struct RuntimeOptions {
    /// User to switch to after startup, by name or numeric id.
    #[arg(long, visible_alias = "user", value_name = "UID")]
    pub uid: Option<String>,

    /// Group to switch to after startup, by name or numeric id.
    #[arg(long, visible_alias = "group", value_name = "GID")]
    pub gid: Option<String>,
}

impl RuntimeOptions {
    /// Parse from the process arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Drop privileges to the configured user and group, group first.
    #[cfg(unix)]
    pub fn lower_privileges(&self) -> Result<(), PrivilegeError> {
        use nix::unistd::{setgid, setuid, Gid, Group, Uid, User};

        if let Some(gid) = &self.gid {
            let gid = match gid.parse::<u32>() {
                Ok(raw) => Gid::from_raw(raw),
                Err(_) => match Group::from_name(gid) {
                    Ok(Some(group)) => group.gid,
                    _ => {
                        return Err(PrivilegeError::Unknown {
                            kind: "group",
                            name: gid.clone(),
                        })
                    }
                },
            };
            setgid(gid).map_err(|errno| PrivilegeError::System {
                kind: "group",
                source: std::io::Error::from_raw_os_error(errno as i32),
            })?;
            info!(%gid, "lowered group privileges");
        }
        if let Some(uid) = &self.uid {
            let uid = match uid.parse::<u32>() {
                Ok(raw) => Uid::from_raw(raw),
                Err(_) => match User::from_name(uid) {
                    Ok(Some(user)) => user.uid,
                    _ => {
                        return Err(PrivilegeError::Unknown {
                            kind: "user",
                            name: uid.clone(),
                        })
                    }
                },
            };
            setuid(uid).map_err(|errno| PrivilegeError::System {
                kind: "user",
                source: std::io::Error::from_raw_os_error(errno as i32),
            })?;
            info!(%uid, "lowered user privileges");
        }
        Ok(())
    }

    /// Privilege lowering is a no-op on non-POSIX targets.
    #[cfg(not(unix))]
    pub fn lower_privileges(&self) -> Result<(), PrivilegeError> {
        if self.uid.is_some() || self.gid.is_some() {
            tracing::warn!("privilege lowering is not supported on this platform");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uid_and_gid_aliases() {
        let options =
            RuntimeOptions::try_parse_from(["prog", "--user", "www-data", "--gid", "33"]).unwrap();
        assert_eq!(options.uid.as_deref(), Some("www-data"));
        assert_eq!(options.gid.as_deref(), Some("33"));
    }

    #[test]
    fn absent_options_mean_no_lowering() {
        let options = RuntimeOptions::try_parse_from(["prog"]).unwrap();
        assert!(options.uid.is_none());
        assert!(options.gid.is_none());
        assert!(options.lower_privileges().is_ok());
    }
}
