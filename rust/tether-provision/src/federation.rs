use tether_common::{Deferred, OnceMap};
use tether_engine::Rejection;
use tether_model::{Provider, ScopeId};

use crate::TetherProvisionError;

/// Issuer of CI identity tokens.
pub const TOKEN_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// A scope's trust in the CI token issuer.
///
/// Every identity in the scope is bound to the same trust, so it is created
/// once per (provider, scope) and never again.
#[derive(Debug, Clone)]
pub struct FederationTrust {
    /// The provider the scope belongs to.
    pub provider: Provider,
    /// The scope holding the trust.
    pub scope: ScopeId,
    /// Names of the declarations making up the trust, in creation order.
    pub anchors: Vec<String>,
    /// What identity bindings name as the trusted principal (the identity
    /// provider ARN, or the workload identity pool name).
    pub principal: Deferred<String, Rejection>,
    /// What CI presents when it authenticates (the identity provider ARN, or
    /// the workload identity pool provider name).
    pub issuer: Deferred<String, Rejection>,
}

impl FederationTrust {
    /// Resolves once every part of the trust exists.
    pub fn ready(&self) -> Deferred<(), Rejection> {
        self.principal.zip(&self.issuer).apply(|_| ())
    }
}

/// The memoized federation trusts of a run.
///
/// The cache is handed to every pipeline that needs a trust; the first
/// pipeline to ask for a scope's trust declares it, later ones reuse it.
#[derive(Debug, Clone, Default)]
pub struct Federations {
    trusts: OnceMap<(Provider, ScopeId), FederationTrust>,
}

impl Federations {
    /// The trust of `scope`, declared with `declare` if this is the first
    /// time it is asked for. A failed declaration is not memoized.
    pub fn establish<F>(
        &self,
        provider: Provider,
        scope: &ScopeId,
        declare: F,
    ) -> Result<FederationTrust, TetherProvisionError>
    where
        F: FnOnce(&ScopeId) -> Result<FederationTrust, TetherProvisionError>,
    {
        self.trusts
            .try_get_or_init((provider, scope.clone()), |(_, scope)| declare(scope))
    }

    /// The trust of `scope`, if it was established.
    pub fn get(&self, provider: Provider, scope: &ScopeId) -> Option<FederationTrust> {
        self.trusts.get(&(provider, scope.clone()))
    }

    /// Scopes of `provider` holding a trust, in establishment order.
    pub fn scopes(&self, provider: Provider) -> Vec<ScopeId> {
        self.trusts
            .keys()
            .into_iter()
            .filter(|(owner, _)| *owner == provider)
            .map(|(_, scope)| scope)
            .collect()
    }

    /// The number of established trusts across all providers.
    pub fn len(&self) -> usize {
        self.trusts.len()
    }

    /// Whether no trust was established.
    pub fn is_empty(&self) -> bool {
        self.trusts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tether_common::Deferred;
    use tether_model::{Provider, ScopeId};
    use testresult::TestResult;

    use super::{FederationTrust, Federations};
    use crate::TetherProvisionError;

    fn trust(scope: &ScopeId) -> Result<FederationTrust, TetherProvisionError> {
        let arn = Deferred::resolved(format!("arn:aws:iam::{scope}:oidc-provider/issuer"));
        Ok(FederationTrust {
            provider: Provider::Aws,
            scope: scope.clone(),
            anchors: vec![format!("aws-iam-identity-provider-{scope}")],
            principal: arn.clone(),
            issuer: arn,
        })
    }

    #[tokio::test]
    async fn it_establishes_each_trust_once() -> TestResult {
        let federations = Federations::default();
        let scope = ScopeId::from("111");
        let mut declared = 0;

        for _ in 0..3 {
            federations.establish(Provider::Aws, &scope, |scope| {
                declared += 1;
                trust(scope)
            })?;
        }
        federations.establish(Provider::Google, &scope, trust)?;

        assert_eq!(declared, 1);
        assert_eq!(federations.len(), 2);
        assert_eq!(federations.scopes(Provider::Aws), vec![scope.clone()]);

        let established = federations.get(Provider::Aws, &scope).ok_or("no trust")?;
        established.ready().await?;
        assert_eq!(
            established.principal.await?,
            "arn:aws:iam::111:oidc-provider/issuer"
        );
        Ok(())
    }

    #[test]
    fn it_forgets_a_failed_declaration() {
        let federations = Federations::default();
        let scope = ScopeId::from("111");

        let failed = federations.establish(Provider::Aws, &scope, |scope| {
            Err(TetherProvisionError::MissingProviderHandle {
                provider: Provider::Aws,
                scope: scope.clone(),
            })
        });

        assert!(failed.is_err());
        assert!(federations.get(Provider::Aws, &scope).is_none());
    }
}
