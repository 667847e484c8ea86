use thiserror::Error;

/// Coin lifecycle errors.
#[derive(Debug, Error)]
pub enum CoinError {
    #[error("header chain: {0}")]
    Chain(#[from] chain_headers::ChainError),

    #[error("blockchain client: {0}")]
    Client(#[from] blockchain_client::ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_error_converts() {
        let err: CoinError = chain_headers::ChainError::InvalidProofOfWork { height: 3 }.into();
        assert_eq!(err.to_string(), "header chain: invalid proof of work at height 3");
    }

    #[test]
    fn store_error_converts_through_chain_error() {
        let store_err = chain_headers::StoreError::Database("disk full".into());
        let err: CoinError = chain_headers::ChainError::from(store_err).into();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn client_error_converts() {
        let err: CoinError = blockchain_client::ClientError::Connection("refused".into()).into();
        assert!(matches!(err, CoinError::Client(_)));
    }
}
