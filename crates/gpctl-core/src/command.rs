//! Commands run from a database installation.

use std::path::Path;
use tokio::process::Command;

/// Builds a command for `<gphome>/bin/<program>` with the installation's
/// environment applied (GPHOME, PATH and library path).
pub fn gp_command(gphome: &Path, program: &str) -> Command {
    let bin = gphome.join("bin");
    let lib = gphome.join("lib");

    let path = match std::env::var_os("PATH") {
        Some(existing) => {
            let mut paths = vec![bin.clone()];
            paths.extend(std::env::split_paths(&existing));
            std::env::join_paths(paths).unwrap_or(existing)
        }
        None => bin.clone().into_os_string(),
    };

    let mut cmd = Command::new(bin.join(program));
    cmd.env("GPHOME", gphome)
        .env("PATH", path)
        .env("LD_LIBRARY_PATH", lib)
        .kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gp_command_resolves_under_gphome_bin() {
        let cmd = gp_command(Path::new("/usr/local/gpdb"), "pg_ctl");
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/usr/local/gpdb/bin/pg_ctl");
        let gphome = std_cmd
            .get_envs()
            .find(|(k, _)| *k == "GPHOME")
            .and_then(|(_, v)| v);
        assert_eq!(gphome, Some(std::ffi::OsStr::new("/usr/local/gpdb")));
    }
}
