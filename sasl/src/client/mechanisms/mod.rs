//! Provides a few SASL mechanisms.

mod anonymous;
mod external;
mod oauthbearer;
mod plain;
mod xoauth2;

#[cfg(feature = "scram")]
mod scram;

pub use self::anonymous::Anonymous;
pub use self::external::External;
pub use self::oauthbearer::OAuthBearer;
pub use self::plain::Plain;
pub use self::xoauth2::XOAuth2;

#[cfg(feature = "scram")]
#[cfg_attr(docsrs, doc(cfg(feature = "scram")))]
pub use self::scram::Scram;
