use crate::error::{Error, Result};
use crate::lookup::ServerResourceLookup;
use crate::platform::LbConfig;

async fn cert_id(lookup: &dyn ServerResourceLookup, name: &str) -> Result<String> {
    match lookup.cert(name).await? {
        Some(cert) => Ok(cert.id),
        None => Err(Error::DependencyNotFound(format!(
            "Failed to find certificate {name}"
        ))),
    }
}

/// Replaces certificate names with their ids.
pub(crate) async fn populate_certs(
    lookup: &dyn ServerResourceLookup,
    lb_config: &mut LbConfig,
    default_cert: &str,
    certs: &[String],
) -> Result<()> {
    if !default_cert.is_empty() {
        lb_config.default_certificate_id = cert_id(lookup, default_cert).await?;
    }

    let mut ids = Vec::with_capacity(certs.len());
    for name in certs {
        ids.push(cert_id(lookup, name).await?);
    }
    lb_config.certificate_ids = ids;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::PlatformLookup;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::{Platform, CERTIFICATE};
    use serde_json::json;
    use std::sync::Arc;

    fn lookup() -> PlatformLookup {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(CERTIFICATE, json!({"id": "1c1", "name": "default"}));
        mock.insert(CERTIFICATE, json!({"id": "1c2", "name": "extra"}));
        PlatformLookup::new("1st1", Platform::new(mock))
    }

    #[tokio::test]
    async fn test_names_become_ids() {
        let mut lb = LbConfig::default();
        populate_certs(&lookup(), &mut lb, "default", &["extra".to_string()])
            .await
            .unwrap();
        assert_eq!(lb.default_certificate_id, "1c1");
        assert_eq!(lb.certificate_ids, ["1c2"]);
    }

    #[tokio::test]
    async fn test_missing_cert_is_dependency_error() {
        let mut lb = LbConfig::default();
        let err = populate_certs(&lookup(), &mut lb, "", &["gone".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_dependency_not_found());
        assert_eq!(err.to_string(), "Failed to find certificate gone");
    }
}
