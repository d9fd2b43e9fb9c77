use super::ConnectionSpec;
use std::path::Path;

pub const TOOL: &str = "mysqldump";

const STD_OPTS: [&str; 6] = [
    "--compact",
    "--skip-add-drop-table",
    "--skip-add-locks",
    "--skip-disable-keys",
    "--skip-set-charset",
    "-v",
];

pub fn arguments(spec: &ConnectionSpec, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = STD_OPTS.iter().map(|s| s.to_string()).collect();
    args.extend([
        "-h".to_string(),
        spec.host.clone(),
        "-P".to_string(),
        spec.port.to_string(),
        "-u".to_string(),
        spec.username.clone(),
        format!("--password={}", spec.password),
        "--databases".to_string(),
        spec.database.clone(),
        "-r".to_string(),
        output.display().to_string(),
    ]);
    args
}
