use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `CHANGE MASTER TO ...` arguments. Every field is `Option` because the
/// statement only ever touches the knobs the caller actually names; unset
/// fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeMasterParams {
    pub master_host: Option<String>,
    pub master_port: Option<u16>,
    pub master_user: Option<String>,
    pub master_auto_position: Option<bool>,
    pub master_log_file: Option<String>,
    pub master_log_pos: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeMasterError {
    #[error("both threads must be stopped before CHANGE MASTER")]
    MustStop,
    #[error("MASTER_AUTO_POSITION cannot be combined with MASTER_LOG_FILE/MASTER_LOG_POS")]
    BadSlaveAutoPosition,
    #[error("MASTER_AUTO_POSITION requires GTID_MODE=ON")]
    AutoPositionRequiresGtidModeOn,
}

/// Pure precondition check, independent of any live registry state so it
/// can be exercised directly in tests.
pub fn validate_change_master(params: &ChangeMasterParams, gtid_mode_on: bool) -> Result<(), ChangeMasterError> {
    let explicit_coord = params.master_log_file.is_some() || params.master_log_pos.is_some();
    if params.master_auto_position == Some(true) && explicit_coord {
        return Err(ChangeMasterError::BadSlaveAutoPosition);
    }
    if params.master_auto_position == Some(true) && !gtid_mode_on {
        return Err(ChangeMasterError::AutoPositionRequiresGtidModeOn);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_auto_position_with_explicit_coord() {
        let params = ChangeMasterParams {
            master_auto_position: Some(true),
            master_log_file: Some("mysql-bin.000010".into()),
            ..Default::default()
        };
        assert_eq!(validate_change_master(&params, true), Err(ChangeMasterError::BadSlaveAutoPosition));
    }

    #[test]
    fn rejects_auto_position_without_gtid_mode() {
        let params = ChangeMasterParams {
            master_auto_position: Some(true),
            ..Default::default()
        };
        assert_eq!(validate_change_master(&params, false), Err(ChangeMasterError::AutoPositionRequiresGtidModeOn));
    }

    #[test]
    fn accepts_plain_host_change() {
        let params = ChangeMasterParams {
            master_host: Some("replica-source".into()),
            ..Default::default()
        };
        assert!(validate_change_master(&params, false).is_ok());
    }
}
