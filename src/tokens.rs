//! Signed-token registry.
//!
//! A thin wrapper over HS256 JWTs sharing one cluster secret. The
//! ledger mints two kinds of tokens with it: short-lived pending
//! tokens bound to a specific node identifier through the `aud`
//! claim (plus the node's host in the custom `hst` claim), and
//! long-lived audience-less renewal tokens handed out once a child
//! completes registration. Everything else in the system treats the
//! token as an opaque string.

use {
  jsonwebtoken::{
    errors::ErrorKind,
    Algorithm,
    DecodingKey,
    EncodingKey,
    Header,
    Validation,
  },
  serde::{Deserialize, Serialize},
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("token has expired")]
  Expired,

  #[error("token was signed by a different issuer")]
  WrongIssuer,

  #[error("token is bound to a different audience")]
  WrongAudience,

  #[error("token is tampered or malformed: {0}")]
  Tampered(String),
}

impl From<jsonwebtoken::errors::Error> for Error {
  fn from(error: jsonwebtoken::errors::Error) -> Self {
    match error.kind() {
      ErrorKind::ExpiredSignature => Error::Expired,
      ErrorKind::InvalidIssuer => Error::WrongIssuer,
      ErrorKind::InvalidAudience => Error::WrongAudience,
      _ => Error::Tampered(error.to_string()),
    }
  }
}

/// Claims carried by every minted token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub iss: String,
  pub exp: i64,

  /// Identifier of the single node this token is valid for.
  /// Renewal tokens carry no audience.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub aud: Option<String>,

  /// Host bound to a pending token at mint time; the registering
  /// node must come back from this address.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hst: Option<String>,
}

#[derive(Clone)]
pub struct TokenRegistry {
  issuer: String,
  encoding: EncodingKey,
  decoding: DecodingKey,
}

impl std::fmt::Debug for TokenRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TokenRegistry")
      .field("issuer", &self.issuer)
      .finish()
  }
}

impl TokenRegistry {
  pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
    Self {
      issuer: issuer.into(),
      encoding: EncodingKey::from_secret(secret.as_bytes()),
      decoding: DecodingKey::from_secret(secret.as_bytes()),
    }
  }

  /// Re-points the registry at a new identity. Happens once, when a
  /// bootstrapping node adopts the identifier minted by its parent.
  pub fn set_issuer(&mut self, issuer: impl Into<String>) {
    self.issuer = issuer.into();
  }

  pub fn issuer(&self) -> &str {
    &self.issuer
  }

  /// Mints a token expiring `ttl_seconds` from now. A negative TTL
  /// produces an already-expired token, which tests lean on.
  pub fn encode(
    &self,
    ttl_seconds: i64,
    audience: Option<String>,
    hst: Option<String>,
  ) -> Result<String, Error> {
    let claims = Claims {
      iss: self.issuer.clone(),
      exp: chrono::Utc::now().timestamp() + ttl_seconds,
      aud: audience,
      hst,
    };

    jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
      .map_err(Error::from)
  }

  /// Verifies signature, expiry, our issuer, and the audience.
  ///
  /// The audience rule follows the token: a token carrying an `aud`
  /// claim decodes only under exactly that audience, while an
  /// audience-less token decodes under any. Changing the supplied
  /// audience therefore changes the subject under verification for
  /// bound tokens without locking out the unbound renewal kind.
  pub fn decode(
    &self,
    token: &str,
    audience: Option<&str>,
  ) -> Result<Claims, Error> {
    let claims = self.verify(token, Some(&self.issuer))?;

    match (&claims.aud, audience) {
      (None, _) => {}
      (Some(aud), Some(expected)) if aud == expected => {}
      (Some(_), _) => return Err(Error::WrongAudience),
    }

    Ok(claims)
  }

  /// Signature and expiry check only, no issuer or audience. Used by
  /// a bootstrapping child to sanity-check a token minted by its
  /// future parent before presenting it back.
  pub fn inspect(&self, token: &str) -> Result<Claims, Error> {
    self.verify(token, None)
  }

  fn verify(
    &self,
    token: &str,
    issuer: Option<&str>,
  ) -> Result<Claims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    // the audience is matched manually against the claim so that
    // audience-less tokens stay decodable; `validation.aud` is left
    // unset on purpose
    if let Some(issuer) = issuer {
      validation.set_issuer(&[issuer]);
    }

    let data =
      jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;
    Ok(data.claims)
  }
}

#[cfg(test)]
mod tests {
  use super::{Error, TokenRegistry};

  fn registry(issuer: &str) -> TokenRegistry {
    TokenRegistry::new("secret", issuer)
  }

  #[test]
  fn round_trips_issuer_and_custom_claims() {
    let registry = registry("parent-node");
    let token = registry
      .encode(10, Some("child".into()), Some("http://child:5001".into()))
      .unwrap();

    let claims = registry.decode(&token, Some("child")).unwrap();
    assert_eq!(claims.iss, "parent-node");
    assert_eq!(claims.aud.as_deref(), Some("child"));
    assert_eq!(claims.hst.as_deref(), Some("http://child:5001"));
  }

  #[test]
  fn rejects_a_different_issuer() {
    let token = registry("foo").encode(10, None, None).unwrap();
    let result = registry("bar").decode(&token, None);
    assert!(matches!(result, Err(Error::WrongIssuer)));
  }

  #[test]
  fn rejects_a_different_audience() {
    let registry = registry("foo");
    let token = registry.encode(10, Some("alpha".into()), None).unwrap();
    let result = registry.decode(&token, Some("beta"));
    assert!(matches!(result, Err(Error::WrongAudience)));
  }

  #[test]
  fn rejects_a_bound_token_without_an_audience() {
    let registry = registry("foo");
    let token = registry.encode(10, Some("alpha".into()), None).unwrap();
    let result = registry.decode(&token, None);
    assert!(matches!(result, Err(Error::WrongAudience)));
  }

  #[test]
  fn unbound_tokens_decode_under_any_audience() {
    let registry = registry("foo");
    let token = registry.encode(10, None, None).unwrap();
    assert!(registry.decode(&token, Some("whoever")).is_ok());
    assert!(registry.decode(&token, None).is_ok());
  }

  #[test]
  fn rejects_expired_tokens() {
    let registry = registry("foo");
    let token = registry.encode(-1, None, None).unwrap();
    assert!(matches!(registry.decode(&token, None), Err(Error::Expired)));
  }

  #[test]
  fn rejects_tampered_tokens() {
    let registry = registry("foo");
    let token = registry.encode(10, None, None).unwrap();
    let forged = format!("{}x", &token[..token.len() - 1]);
    assert!(matches!(
      registry.decode(&forged, None),
      Err(Error::Tampered(_))
    ));
  }

  #[test]
  fn inspect_skips_issuer_but_not_expiry() {
    let parent = registry("parent");
    let child = registry("child");
    let token = parent.encode(10, None, None).unwrap();
    assert!(child.inspect(&token).is_ok());

    let stale = parent.encode(-1, None, None).unwrap();
    assert!(matches!(child.inspect(&stale), Err(Error::Expired)));
  }
}
