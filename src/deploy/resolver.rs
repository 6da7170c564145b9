use crate::deploy::{DeployError, Result};
use crate::remote::{ControlPlane, ServiceVersion};
use tracing::{debug, info};

/// Picks the base version for a deploy: the active one, else the most recently
/// locked one, else the most recently updated one.
///
/// Versions are ordered by `updated_at` with a stable sort, so ties keep the
/// order the control plane returned them in.
pub fn select_version(versions: &[ServiceVersion]) -> Option<ServiceVersion> {
    let mut ordered: Vec<&ServiceVersion> = versions.iter().collect();
    ordered.sort_by_key(|v| v.updated_at);

    let mut active = None;
    let mut locked = None;
    let mut latest = None;
    for version in ordered {
        if version.active {
            active = Some(version);
        }
        if version.locked {
            locked = Some(version);
        }
        latest = Some(version);
    }

    active.or(locked).or(latest).cloned()
}

/// Resolves the remote version a package should be uploaded to.
pub struct VersionResolver<'a> {
    api: &'a dyn ControlPlane,
    service_id: &'a str,
}

impl<'a> VersionResolver<'a> {
    pub fn new(api: &'a dyn ControlPlane, service_id: &'a str) -> Self {
        Self { api, service_id }
    }

    /// Returns an editable version, cloning the chosen one when it is active or locked.
    pub async fn resolve(&self, explicit: Option<u32>) -> Result<ServiceVersion> {
        let base = self.base(explicit).await?;
        self.editable(&base).await
    }

    /// The version a deploy builds on: `explicit` when given, else [`select_version`].
    /// Nothing is cloned.
    pub async fn base(&self, explicit: Option<u32>) -> Result<ServiceVersion> {
        let versions = self
            .api
            .list_versions(self.service_id)
            .await
            .map_err(|e| DeployError::collaborator("error listing service versions", e))?;

        let chosen = match explicit {
            Some(number) => versions
                .iter()
                .find(|v| v.number == number)
                .cloned()
                .ok_or_else(|| {
                    DeployError::validation(
                        "version",
                        format!("service {} has no version {number}", self.service_id),
                    )
                })?,
            None => select_version(&versions).ok_or_else(|| {
                DeployError::validation(
                    "version",
                    format!("service {} has no versions", self.service_id),
                )
            })?,
        };
        debug!(
            "Selected version {} (active: {}, locked: {})",
            chosen.number, chosen.active, chosen.locked
        );
        Ok(chosen)
    }

    /// `base` itself when it is a draft, otherwise a fresh clone of it.
    pub async fn editable(&self, base: &ServiceVersion) -> Result<ServiceVersion> {
        if !base.is_immutable() {
            return Ok(base.clone());
        }

        let cloned = self
            .api
            .clone_version(self.service_id, base.number)
            .await
            .map_err(|e| DeployError::collaborator("error cloning service version", e))?;
        info!(
            "Cloned version {} of service {} to version {}",
            base.number, self.service_id, cloned.number
        );
        Ok(cloned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn version(number: u32, active: bool, locked: bool, secs: i64) -> ServiceVersion {
        ServiceVersion {
            number,
            active,
            locked,
            updated_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_active_wins_over_newer_locked() {
        let versions = vec![version(1, true, false, 10), version(2, false, true, 20)];
        assert_eq!(select_version(&versions).unwrap().number, 1);
    }

    #[test]
    fn test_locked_wins_over_newer_draft() {
        let versions = vec![
            version(3, false, false, 30),
            version(2, false, true, 20),
            version(1, false, false, 10),
        ];
        assert_eq!(select_version(&versions).unwrap().number, 2);
    }

    #[test]
    fn test_latest_by_update_time_when_nothing_is_pinned() {
        let versions = vec![version(2, false, false, 50), version(5, false, false, 40)];
        assert_eq!(select_version(&versions).unwrap().number, 2);
    }

    #[test]
    fn test_most_recent_of_several_locked() {
        let versions = vec![
            version(4, false, true, 40),
            version(6, false, true, 60),
            version(5, false, true, 50),
        ];
        assert_eq!(select_version(&versions).unwrap().number, 6);
    }

    #[test]
    fn test_empty_list_selects_nothing() {
        assert!(select_version(&[]).is_none());
    }
}
