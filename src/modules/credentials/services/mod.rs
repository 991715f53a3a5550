pub mod credential_issuer;

pub use credential_issuer::{
    generate_token, hash_token, CredentialIssuer, IssuedSetupLink, RedeemedSetupLink,
    DEFAULT_TTL_HOURS,
};
