//! OIDC identity providers built on the openidconnect crate.
//!
//! [`OidcClient`] holds the discovered provider metadata and does the
//! provider-independent work of a flow. [`GoogleFlow`] and [`AzureFlow`]
//! add each provider's claim mapping and access-token check.

use async_trait::async_trait;
use base64::Engine;
use gatekeep_platform_access::{
    AuthenticationError, CallbackParams, FlowInitiation, FlowState, IdentityProvider, OidcConfig,
    ProviderKind, VerifiedIdentity, federation::authorization_code,
};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreIdTokenVerifier, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse,
};
use rootcause::Report;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Google's access-token introspection endpoint.
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Claims read from a verified ID token.
#[derive(Debug)]
struct VerifiedToken {
    subject: String,
    email: Option<String>,
    /// Full JWT payload, for provider-specific claims.
    payload: Value,
}

/// Provider-independent OIDC client.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    http_client: reqwest::Client,
    config: OidcConfig,
}

impl OidcClient {
    /// Creates a client by discovering the provider metadata.
    pub async fn discover(config: OidcConfig) -> Result<Self, Report<AuthenticationError>> {
        config.validate()?;
        let issuer_url = IssuerUrl::new(config.issuer_url()?).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid issuer URL: {e}"),
            }
        })?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthenticationError::Configuration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| AuthenticationError::Network {
                reason: format!("failed to discover provider: {e}"),
            })?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            http_client,
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    fn redirect_url(callback_uri: &str) -> Result<RedirectUrl, AuthenticationError> {
        RedirectUrl::new(callback_uri.to_string()).map_err(|e| AuthenticationError::Configuration {
            reason: format!("invalid redirect URI '{callback_uri}': {e}"),
        })
    }

    /// Generates the authorization URL and the state the callback needs.
    fn initiate(
        &self,
        callback_uri: &str,
        extra_params: &[(&'static str, String)],
    ) -> Result<FlowInitiation, Report<AuthenticationError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(Self::redirect_url(callback_uri)?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }
        for (name, value) in extra_params {
            auth_request = auth_request.add_extra_param(*name, value.clone());
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        Ok(FlowInitiation {
            authorization_url: auth_url.to_string(),
            flow: FlowState {
                state: csrf_token.secret().clone(),
                nonce: nonce.secret().clone(),
                pkce_verifier: pkce_verifier.secret().clone(),
                callback_uri: callback_uri.to_string(),
            },
        })
    }

    /// Exchanges the authorization code and verifies the ID token.
    async fn complete(
        &self,
        provider: ProviderKind,
        params: &CallbackParams,
        flow: &FlowState,
    ) -> Result<VerifiedToken, Report<AuthenticationError>> {
        let code = authorization_code(provider, params, flow)?;

        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(Self::redirect_url(&flow.callback_uri)?);

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| AuthenticationError::Configuration {
                reason: format!("token endpoint error: {e}"),
            })?;

        let token_response = token_request
            .set_pkce_verifier(PkceCodeVerifier::new(flow.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => AuthenticationError::Network {
                    reason: e.to_string(),
                },
                other => AuthenticationError::TokenExchange {
                    reason: other.to_string(),
                },
            })?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| AuthenticationError::MissingClaim {
                claim: "id_token".to_string(),
            })?;

        let nonce = Nonce::new(flow.nonce.clone());
        let claims = id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("ID token validation failed: {e}"),
            })?;

        Ok(VerifiedToken {
            subject: claims.subject().to_string(),
            email: claims
                .email()
                .map(|e| e.as_str().to_string())
                .or_else(|| claims.preferred_username().map(|u| u.as_str().to_string())),
            payload: jwt_payload(&id_token.to_string())?,
        })
    }

    /// Verifies a provider-signed JWT access token against the discovered
    /// signing keys, accepting any configured client as audience.
    fn verify_access_token(&self, token: &str) -> Option<Value> {
        let parsed = CoreIdToken::from_str(token).ok()?;
        let issuer = self.provider_metadata.issuer().clone();
        let jwks = self.provider_metadata.jwks().clone();

        self.config.accepted_audiences().into_iter().find_map(|audience| {
            let verifier = CoreIdTokenVerifier::new_public_client(
                ClientId::new(audience.to_string()),
                issuer.clone(),
                jwks.clone(),
            );
            parsed
                .claims(&verifier, |_: Option<&Nonce>| -> Result<(), String> { Ok(()) })
                .map_err(|e| debug!(audience, error = %e, "access token rejected"))
                .ok()
                .and_then(|_| jwt_payload(token).ok())
        })
    }
}

/// Decodes the payload of a JWT without verifying it.
///
/// Only call this on tokens that have already been verified.
fn jwt_payload(token: &str) -> Result<Value, AuthenticationError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthenticationError::InvalidToken {
            reason: "invalid JWT format".to_string(),
        });
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to decode JWT payload: {e}"),
        })?;

    serde_json::from_slice(&payload_bytes).map_err(|e| AuthenticationError::InvalidToken {
        reason: format!("failed to parse JWT payload: {e}"),
    })
}

fn string_claim(payload: &Value, claim: &str) -> Option<String> {
    payload.get(claim).and_then(Value::as_str).map(str::to_string)
}

/// Google accounts. The login id is `sub`; the organization is the `hd`
/// (hosted domain) claim.
pub struct GoogleFlow {
    client: OidcClient,
}

impl GoogleFlow {
    pub fn new(client: OidcClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    sub: Option<String>,
}

#[async_trait]
impl IdentityProvider for GoogleFlow {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn organization_id(&self) -> &str {
        self.client.config().organization_id().unwrap_or_default()
    }

    fn initiate_flow(
        &self,
        callback_uri: &str,
    ) -> gatekeep_core::Result<FlowInitiation, AuthenticationError> {
        let hint = [("hd", self.organization_id().to_string())];
        self.client.initiate(callback_uri, &hint)
    }

    #[instrument(skip_all)]
    async fn receive_callback(
        &self,
        params: &CallbackParams,
        flow: &FlowState,
    ) -> gatekeep_core::Result<VerifiedIdentity, AuthenticationError> {
        let token = self.client.complete(self.kind(), params, flow).await?;
        Ok(VerifiedIdentity {
            organization_id: string_claim(&token.payload, "hd"),
            login_id: token.subject,
            unverified_email: token.email,
        })
    }

    #[instrument(skip_all)]
    async fn get_identity_uid_from_access_token(
        &self,
        access_token: &str,
    ) -> gatekeep_core::Result<Option<String>, AuthenticationError> {
        let response = self
            .client
            .http_client
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| AuthenticationError::Network {
                reason: e.to_string(),
            })?;

        if response.status().is_client_error() {
            return Ok(None);
        }
        let info: TokenInfo = response
            .error_for_status()
            .map_err(|e| AuthenticationError::Network {
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("unreadable tokeninfo response: {e}"),
            })?;

        let (Some(aud), Some(sub)) = (info.aud, info.sub) else {
            return Ok(None);
        };
        let for_our_client = self.client.config().accepted_audiences().contains(&aud.as_str());
        // Service-account tokens are issued with the account itself as audience.
        let is_service_account = aud == sub;
        Ok((for_our_client || is_service_account).then_some(sub))
    }
}

/// Microsoft Entra ID. The login id is `oid`; the organization is the
/// `tid` (tenant) claim.
pub struct AzureFlow {
    client: OidcClient,
}

impl AzureFlow {
    pub fn new(client: OidcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for AzureFlow {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Microsoft
    }

    fn organization_id(&self) -> &str {
        self.client.config().organization_id().unwrap_or_default()
    }

    fn initiate_flow(
        &self,
        callback_uri: &str,
    ) -> gatekeep_core::Result<FlowInitiation, AuthenticationError> {
        self.client.initiate(callback_uri, &[])
    }

    #[instrument(skip_all)]
    async fn receive_callback(
        &self,
        params: &CallbackParams,
        flow: &FlowState,
    ) -> gatekeep_core::Result<VerifiedIdentity, AuthenticationError> {
        let token = self.client.complete(self.kind(), params, flow).await?;
        let login_id =
            string_claim(&token.payload, "oid").ok_or_else(|| AuthenticationError::MissingClaim {
                claim: "oid".to_string(),
            })?;
        Ok(VerifiedIdentity {
            login_id,
            unverified_email: token.email,
            organization_id: string_claim(&token.payload, "tid"),
        })
    }

    #[instrument(skip_all)]
    async fn get_identity_uid_from_access_token(
        &self,
        access_token: &str,
    ) -> gatekeep_core::Result<Option<String>, AuthenticationError> {
        let Some(payload) = self.client.verify_access_token(access_token) else {
            return Ok(None);
        };
        if string_claim(&payload, "tid").as_deref() != Some(self.organization_id()) {
            debug!("access token issued by another tenant");
            return Ok(None);
        }
        Ok(string_claim(&payload, "oid"))
    }
}
