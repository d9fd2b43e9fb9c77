use super::ConnectionSpec;
use std::path::Path;

pub const TOOL: &str = "pg_dump";

const STD_OPTS: [&str; 5] = ["--no-owner", "--no-acl", "--clean", "--blobs", "-v"];

// Custom archive format; restorable with pg_restore.
const FORMAT: &str = "c";

pub fn arguments(spec: &ConnectionSpec, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = STD_OPTS.iter().map(|s| s.to_string()).collect();
    args.extend([
        format!("-f{}", output.display()),
        format!("--dbname={}", spec.database),
        format!("--host={}", spec.host),
        format!("--port={}", spec.port),
        format!("--username={}", spec.username),
        format!("--format={}", FORMAT),
    ]);
    args
}
