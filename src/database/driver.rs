use super::{CommandBuilder, ConnectionSpec};
use crate::backup::runner;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info_span, Instrument};

/// Produces a dump artifact for one target at `output`.
#[async_trait]
pub trait Dumper: Send + Sync {
    async fn dump(&self, spec: &ConnectionSpec, output: &Path) -> Result<()>;
}

/// Dumps through the engine's external tool (`pg_dump`, `mysqldump`).
#[derive(Debug, Clone, Default)]
pub struct ExternalDumper {
    builder: CommandBuilder,
}

impl ExternalDumper {
    pub fn new(builder: CommandBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Dumper for ExternalDumper {
    async fn dump(&self, spec: &ConnectionSpec, output: &Path) -> Result<()> {
        let cmd = self.builder.build(spec, output)?;
        debug!("Built dump command: {:?}", cmd);

        runner::execute(&cmd)
            .instrument(info_span!("dump", target = %spec.label()))
            .await
    }
}
