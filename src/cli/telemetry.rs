//! Console logging, plus span export over OTLP/gRPC when a collector is
//! configured through the standard `OTEL_*` variables.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine};
use once_cell::sync::OnceCell;
use opentelemetry::{
    global,
    propagation::TextMapCompositePropagator,
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::{env, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Collector connection read from the environment.
#[derive(Debug, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: Vec<(String, String)>,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` unless `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
    fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let endpoint = with_scheme(lookup("OTEL_EXPORTER_OTLP_ENDPOINT")?.trim());

        if let Some(protocol) = lookup("OTEL_EXPORTER_OTLP_PROTOCOL") {
            if protocol != "grpc" {
                debug!(%protocol, "Only the grpc OTLP protocol is supported, ignoring");
            }
        }

        Some(Self {
            endpoint,
            headers: lookup("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| header_pairs(&raw))
                .unwrap_or_default(),
            instance_id: lookup("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|| Ulid::new().to_string()),
        })
    }

    /// Host name to verify against when the endpoint uses TLS.
    fn tls_domain(&self) -> Option<&str> {
        self.endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split(['/', ':']).next())
            .filter(|host| !host.is_empty())
    }

    fn metadata(&self) -> Result<MetadataMap> {
        let mut metadata = MetadataMap::with_capacity(self.headers.len());

        for (name, value) in &self.headers {
            let name = name.to_ascii_lowercase();
            if name.ends_with("-bin") {
                let bytes = general_purpose::STANDARD
                    .decode(value.as_bytes())
                    .map_err(|err| anyhow!("header {name} is not valid base64: {err}"))?;
                let key = MetadataKey::<Binary>::from_bytes(name.as_bytes())
                    .map_err(|err| anyhow!("invalid header name {name}: {err}"))?;
                metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
            } else {
                let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
                    .map_err(|err| anyhow!("invalid header name {name}: {err}"))?;
                let value: MetadataValue<Ascii> = value
                    .parse()
                    .map_err(|err| anyhow!("invalid value for header {name}: {err}"))?;
                metadata.insert(key, value);
            }
        }

        Ok(metadata)
    }

    fn tracer(&self) -> Result<Tracer> {
        let mut builder = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .with_compression(Compression::Gzip)
            .with_timeout(EXPORT_TIMEOUT);

        if let Some(domain) = self.tls_domain() {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(domain.to_string())
                    .with_native_roots(),
            );
        }
        if !self.headers.is_empty() {
            builder = builder.with_metadata(self.metadata()?);
        }

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(builder.build()?)
            .with_resource(
                Resource::builder_empty()
                    .with_attributes([
                        KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                        KeyValue::new("service.instance.id", self.instance_id.clone()),
                    ])
                    .build(),
            )
            .build();

        let _ = PROVIDER.set(provider.clone());
        global::set_tracer_provider(provider.clone());
        global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]));

        Ok(provider.tracer(env!("CARGO_PKG_NAME")))
    }
}

/// Splits `k1=v1,k2=v2`; entries without `=` are skipped.
fn header_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

/// Install the global subscriber at `level`. `RUST_LOG` directives still apply.
///
/// # Errors
///
/// Returns an error if the exporter or the subscriber cannot be installed.
pub fn init(level: Level) -> Result<()> {
    let console = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    let registry = Registry::default().with(console);
    match OtlpSettings::from_env() {
        Some(settings) => {
            let tracer = settings.tracer()?;
            tracing::subscriber::set_global_default(
                registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .with(filter),
            )?;
            debug!(endpoint = %settings.endpoint, "Exporting spans over OTLP");
        }
        None => tracing::subscriber::set_global_default(registry.with(filter))?,
    }

    Ok(())
}

/// Flush pending spans. Does nothing when export was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            debug!("Span exporter shutdown failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Option<OtlpSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        OtlpSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn export_is_off_without_an_endpoint() {
        assert_eq!(settings(&[("OTEL_EXPORTER_OTLP_HEADERS", "a=b")]), None);
    }

    #[test]
    fn settings_read_endpoint_headers_and_instance() {
        let parsed = settings(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "collector.zeek.shop:4317/"),
            ("OTEL_EXPORTER_OTLP_HEADERS", "x-team = shop ,broken, auth=Basic dXNlcjpwYXNz=="),
            ("OTEL_SERVICE_INSTANCE_ID", "web-1"),
        ]);

        assert_eq!(
            parsed,
            Some(OtlpSettings {
                endpoint: "https://collector.zeek.shop:4317".to_string(),
                headers: vec![
                    ("x-team".to_string(), "shop".to_string()),
                    ("auth".to_string(), "Basic dXNlcjpwYXNz==".to_string()),
                ],
                instance_id: "web-1".to_string(),
            })
        );
    }

    #[test]
    fn tls_domain_only_for_https() {
        let secure = settings(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "https://otel.zeek.shop:4317/v1")]);
        assert_eq!(secure.as_ref().and_then(OtlpSettings::tls_domain), Some("otel.zeek.shop"));

        let plain = settings(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317")]);
        assert_eq!(plain.as_ref().and_then(OtlpSettings::tls_domain), None);
    }

    #[test]
    fn metadata_accepts_ascii_and_binary_headers() -> Result<()> {
        let parsed = settings(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("OTEL_EXPORTER_OTLP_HEADERS", "Authorization=Bearer abc,trace-bin=YmluYXJ5"),
        ])
        .ok_or_else(|| anyhow!("no settings"))?;

        let metadata = parsed.metadata()?;
        assert_eq!(metadata.len(), 2);
        assert!(metadata.get("authorization").is_some());
        Ok(())
    }

    #[test]
    fn metadata_rejects_bad_base64() {
        let parsed = settings(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("OTEL_EXPORTER_OTLP_HEADERS", "trace-bin=not base64!"),
        ]);

        assert!(parsed.is_some_and(|parsed| parsed
            .metadata()
            .is_err_and(|err| err.to_string().contains("not valid base64"))));
    }

    #[test]
    fn shutdown_without_exporter_is_a_noop() {
        shutdown_tracer();
    }
}
