//! gRPC-backed [`KvStore`] implementation: dials a remote `KvService`
//! endpoint, optionally over mTLS or SPIFFE-issued identity.

use crate::{kvproto, KvEntry, KvError, KvStore, Result};
use async_trait::async_trait;
use spiffe::cert::Certificate as SpiffeCertificate;
use spiffe::error::GrpcClientError;
use spiffe::workload_api::x509_source::X509SourceError;
use spiffe::{
    BundleSource, SvidSource, TrustDomain, WorkloadApiClient, X509Source, X509SourceBuilder,
};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tokio_stream::StreamExt;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

pub struct KvClient {
    inner: Mutex<kvproto::kv_service_client::KvServiceClient<Channel>>,
}

impl KvClient {
    pub async fn connect_from_env() -> Result<Self> {
        let addr = std::env::var("KV_ADDRESS").map_err(|e| KvError::Other(e.into()))?;
        let mut endpoint = Channel::from_shared(format!("https://{}", addr))
            .map_err(|e| KvError::Other(e.into()))?;
        let sec_mode = std::env::var("KV_SEC_MODE")
            .unwrap_or_else(|_| String::from("none"))
            .to_lowercase();

        endpoint = match sec_mode.as_str() {
            "mtls" => {
                let cert =
                    fs::read(std::env::var("KV_CERT_FILE").map_err(|e| KvError::Other(e.into()))?)
                        .map_err(|e| KvError::Other(e.into()))?;
                let key =
                    fs::read(std::env::var("KV_KEY_FILE").map_err(|e| KvError::Other(e.into()))?)
                        .map_err(|e| KvError::Other(e.into()))?;
                let ca =
                    fs::read(std::env::var("KV_CA_FILE").map_err(|e| KvError::Other(e.into()))?)
                        .map_err(|e| KvError::Other(e.into()))?;
                let server_name = std::env::var("KV_SERVER_NAME")
                    .unwrap_or_else(|_| "datasvc.serviceradar".to_string());
                let tls = ClientTlsConfig::new()
                    .ca_certificate(Certificate::from_pem(ca))
                    .identity(Identity::from_pem(cert, key))
                    .domain_name(server_name);
                endpoint
                    .tls_config(tls)
                    .map_err(|e| KvError::Other(e.into()))?
            }
            "spiffe" => {
                let trust_domain =
                    std::env::var("KV_TRUST_DOMAIN").map_err(|e| KvError::Other(e.into()))?;
                let workload_socket = std::env::var("KV_WORKLOAD_SOCKET")
                    .unwrap_or_else(|_| "unix:/run/spire/sockets/agent.sock".to_string());
                let tls = load_spiffe_tls(&workload_socket, &trust_domain).await?;
                endpoint
                    .tls_config(tls)
                    .map_err(|e| KvError::Other(e.into()))?
            }
            "none" => endpoint,
            _ => endpoint,
        };

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| KvError::Other(e.into()))?;
        Ok(Self {
            inner: Mutex::new(kvproto::kv_service_client::KvServiceClient::new(channel)),
        })
    }

    /// Convenience accessor kept for callers that only care about
    /// presence/absence rather than the full [`KvEntry`].
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entry = self.get(key).await?;
        Ok(if entry.found { Some(entry.value) } else { None })
    }

    pub async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.get(key).await?.found {
            return Ok(());
        }
        self.put(key, value, 0).await
    }
}

#[async_trait]
impl KvStore for KvClient {
    async fn get(&self, key: &str) -> Result<KvEntry> {
        let resp = self
            .inner
            .lock()
            .await
            .get(kvproto::GetRequest {
                key: key.to_string(),
            })
            .await
            .map_err(|e| KvError::Other(e.into()))?
            .into_inner();
        Ok(KvEntry {
            value: resp.value,
            found: resp.found,
            revision: resp.revision as u64,
        })
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        self.inner
            .lock()
            .await
            .put(kvproto::PutRequest {
                key: key.to_string(),
                value,
                ttl_seconds: ttl_seconds as i64,
            })
            .await
            .map_err(|e| KvError::Other(e.into()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .delete(kvproto::DeleteRequest {
                key: key.to_string(),
            })
            .await
            .map_err(|e| KvError::Other(e.into()))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let resp = self
            .inner
            .lock()
            .await
            .list_keys(kvproto::ListKeysRequest {
                prefix: prefix.to_string(),
            })
            .await
            .map_err(|e| KvError::Other(e.into()))?
            .into_inner();
        let mut keys = resp.keys;
        keys.sort();
        Ok(keys)
    }

    async fn batch_get(&self, keys: &[String]) -> Result<HashMap<String, KvEntry>> {
        let resp = self
            .inner
            .lock()
            .await
            .batch_get(kvproto::BatchGetRequest {
                keys: keys.to_vec(),
            })
            .await
            .map_err(|e| KvError::Other(e.into()))?
            .into_inner();
        Ok(resp
            .entries
            .into_iter()
            .map(|e| {
                (
                    e.key,
                    KvEntry {
                        value: e.value,
                        found: e.found,
                        revision: e.revision as u64,
                    },
                )
            })
            .collect())
    }

    async fn watch_apply(&self, key: &str, mut apply: Box<dyn FnMut(&[u8]) + Send>) -> Result<()> {
        let resp = self
            .inner
            .lock()
            .await
            .watch(kvproto::WatchRequest {
                key: key.to_string(),
            })
            .await
            .map_err(|e| KvError::Other(e.into()))?;
        let mut stream = resp.into_inner();
        tokio::spawn(async move {
            while let Ok(Some(item)) = stream.next().await.transpose() {
                apply(&item.value);
            }
        });
        Ok(())
    }
}

async fn load_spiffe_tls(workload_socket: &str, trust_domain: &str) -> Result<ClientTlsConfig> {
    let retry_delay = Duration::from_secs(2);
    let trust_domain = TrustDomain::try_from(trust_domain).map_err(|e| KvError::Other(e.into()))?;

    loop {
        let client = match WorkloadApiClient::new_from_path(workload_socket).await {
            Ok(client) => client,
            Err(err) => {
                if should_retry_grpc(&err) {
                    sleep(retry_delay).await;
                    continue;
                }
                return Err(KvError::Other(err.into()));
            }
        };

        let source = match X509SourceBuilder::new().with_client(client).build().await {
            Ok(source) => source,
            Err(X509SourceError::GrpcError(grpc_err)) => {
                if should_retry_grpc(&grpc_err) {
                    sleep(retry_delay).await;
                    continue;
                }
                return Err(KvError::Other(grpc_err.into()));
            }
            Err(other) => {
                if is_retryable_source_error(&other) {
                    sleep(retry_delay).await;
                    continue;
                }
                return Err(KvError::Other(other.into()));
            }
        };

        let guard = SpiffeSourceGuard {
            source,
            trust_domain: trust_domain.clone(),
        };

        match guard.tls_materials() {
            Ok((identity, ca)) => {
                let mut tls = ClientTlsConfig::new().ca_certificate(ca).identity(identity);
                if let Ok(server_name) = std::env::var("KV_SERVER_NAME") {
                    if !server_name.trim().is_empty() {
                        tls = tls.domain_name(server_name);
                    }
                }
                return Ok(tls);
            }
            Err(err) if is_retryable_tls_error(&err) => {
                sleep(retry_delay).await;
                continue;
            }
            Err(err) => return Err(KvError::Other(err.into())),
        }
    }
}

struct SpiffeSourceGuard {
    source: Arc<X509Source>,
    trust_domain: TrustDomain,
}

impl SpiffeSourceGuard {
    fn tls_materials(&self) -> std::result::Result<(Identity, Certificate), anyhow::Error> {
        let svid = self
            .source
            .get_svid()
            .map_err(|err| anyhow::anyhow!("failed to fetch default X.509 SVID: {err}"))?
            .ok_or_else(|| anyhow::anyhow!("workload API returned no default X.509 SVID"))?;

        let bundle = self
            .source
            .get_bundle_for_trust_domain(&self.trust_domain)
            .map_err(|err| anyhow::anyhow!("failed to fetch X.509 bundle: {err}"))?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no X.509 bundle available for trust domain {}",
                    self.trust_domain
                )
            })?;

        let cert_pem = encode_chain(svid.cert_chain());
        let key_pem = encode_block("PRIVATE KEY", svid.private_key().as_ref());
        let ca_pem = encode_chain(bundle.authorities());

        Ok((
            Identity::from_pem(cert_pem.into_bytes(), key_pem.into_bytes()),
            Certificate::from_pem(ca_pem.into_bytes()),
        ))
    }
}

fn encode_chain(items: &[SpiffeCertificate]) -> String {
    items
        .iter()
        .map(|cert| encode_block("CERTIFICATE", cert.as_ref()))
        .collect()
}

fn encode_block(tag: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag.to_string(), der.to_vec()))
}

fn should_retry_grpc(err: &GrpcClientError) -> bool {
    matches!(
        err,
        GrpcClientError::Grpc(_) | GrpcClientError::Transport(_)
    )
}

fn is_retryable_source_error(err: &X509SourceError) -> bool {
    matches!(err, X509SourceError::NoSuitableSvid)
}

fn is_retryable_tls_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("no default X.509 SVID")
        || msg.contains("failed to fetch default X.509 SVID")
        || msg.contains("no X.509 bundle available")
        || msg.contains("failed to fetch X.509 bundle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spiffe_rejects_invalid_trust_domain() {
        let err = load_spiffe_tls("unix:/nonexistent.sock", "not a trust domain")
            .await
            .unwrap_err();
        let msg = format!("{err:?}");
        assert!(
            msg.contains("invalid trust domain") || msg.contains("BadTrustDomainChar"),
            "expected invalid trust domain error, got {msg}"
        );
    }
}
