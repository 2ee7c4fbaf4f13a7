//! Mapping probe samples onto connection statuses

use super::HealthSample;
use crate::config::GroupParams;
use crate::node::{ConnectionStatus, RejectedReason};

/// Classify one successful probe.
///
/// `max_height` is the best height reported in the current cycle and
/// `previous` the node's status before the cycle started. A node that was
/// already synchronizing and is still behind becomes final.
pub fn classify(
    sample: &HealthSample,
    max_height: u64,
    previous: Option<ConnectionStatus>,
    params: &GroupParams,
) -> ConnectionStatus {
    if !params.accepts_version(sample.version.as_ref()) {
        return ConnectionStatus::NotAllowed {
            reason: RejectedReason::OutdatedApiVersion,
        };
    }

    let lag = max_height.saturating_sub(sample.height);
    if lag <= params.height_epsilon {
        return ConnectionStatus::Allowed;
    }

    let was_behind = matches!(previous, Some(ConnectionStatus::Synchronizing { .. }));
    ConnectionStatus::Synchronizing {
        is_final: was_behind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkGroup;
    use semver::Version;
    use std::time::Duration;

    fn sample(height: u64, version: (u64, u64, u64)) -> HealthSample {
        HealthSample {
            ping: Duration::from_millis(50),
            height,
            version: Some(Version::new(version.0, version.1, version.2)),
            ws_enabled: false,
            ws_port: None,
        }
    }

    fn adm() -> GroupParams {
        // epsilon 10, min version 0.8.0
        GroupParams::defaults(NetworkGroup::Adm)
    }

    #[test]
    fn test_within_epsilon_is_allowed() {
        let params = adm();
        assert_eq!(
            classify(&sample(1000, (0, 8, 3)), 1000, None, &params),
            ConnectionStatus::Allowed
        );
        assert_eq!(
            classify(&sample(990, (0, 8, 3)), 1000, None, &params),
            ConnectionStatus::Allowed
        );
    }

    #[test]
    fn test_behind_becomes_final_on_second_cycle() {
        let params = adm();
        let first = classify(&sample(989, (0, 8, 3)), 1000, Some(ConnectionStatus::Allowed), &params);
        assert_eq!(first, ConnectionStatus::Synchronizing { is_final: false });

        let second = classify(&sample(995, (0, 8, 3)), 1010, Some(first), &params);
        assert_eq!(second, ConnectionStatus::Synchronizing { is_final: true });

        let caught_up = classify(&sample(1010, (0, 8, 3)), 1010, Some(second), &params);
        assert_eq!(caught_up, ConnectionStatus::Allowed);
    }

    #[test]
    fn test_offline_then_behind_is_not_final() {
        let status = classify(
            &sample(0, (0, 8, 3)),
            1000,
            Some(ConnectionStatus::Offline),
            &adm(),
        );
        assert_eq!(status, ConnectionStatus::Synchronizing { is_final: false });
    }

    #[test]
    fn test_outdated_version_wins_over_height() {
        let status = classify(&sample(1000, (0, 7, 9)), 1000, None, &adm());
        assert_eq!(
            status,
            ConnectionStatus::NotAllowed {
                reason: RejectedReason::OutdatedApiVersion
            }
        );
    }

    #[test]
    fn test_height_above_cycle_max_is_allowed() {
        // A provisional max can trail a node that answered later
        assert_eq!(
            classify(&sample(2000, (0, 9, 0)), 1000, None, &adm()),
            ConnectionStatus::Allowed
        );
    }
}
