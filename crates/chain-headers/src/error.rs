use thiserror::Error;

/// Header store persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupted header record at height {height}: {reason}")]
    Corrupted { height: u32, reason: String },
}

/// Header chain validation and sync errors.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain discontinuity at height {height}: {reason}")]
    Discontinuity { height: u32, reason: String },

    #[error("invalid proof of work at height {height}")]
    InvalidProofOfWork { height: u32 },

    #[error("reorg deeper than safety bound {max_depth}: fork rolls back {rolled_back} headers")]
    ReorgTooDeep { max_depth: u32, rolled_back: u32 },

    #[error("header store: {0}")]
    Store(#[from] StoreError),

    #[error("blockchain client: {0}")]
    Client(#[from] blockchain_client::ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_discontinuity() {
        let err = ChainError::Discontinuity {
            height: 42,
            reason: "previous hash mismatch".into(),
        };
        assert_eq!(
            err.to_string(),
            "chain discontinuity at height 42: previous hash mismatch"
        );
    }

    #[test]
    fn display_invalid_proof_of_work() {
        let err = ChainError::InvalidProofOfWork { height: 7 };
        assert_eq!(err.to_string(), "invalid proof of work at height 7");
    }

    #[test]
    fn display_reorg_too_deep() {
        let err = ChainError::ReorgTooDeep {
            max_depth: 100,
            rolled_back: 150,
        };
        assert_eq!(
            err.to_string(),
            "reorg deeper than safety bound 100: fork rolls back 150 headers"
        );
    }

    #[test]
    fn store_error_converts_into_chain_error() {
        let err: ChainError = StoreError::Database("io failure".into()).into();
        assert!(matches!(err, ChainError::Store(_)));
        assert!(err.to_string().contains("io failure"));
    }

    #[test]
    fn client_error_converts_into_chain_error() {
        let err: ChainError =
            blockchain_client::ClientError::Request("timeout".into()).into();
        assert!(matches!(err, ChainError::Client(_)));
    }
}
