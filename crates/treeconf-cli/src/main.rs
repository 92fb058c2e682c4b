use std::process::ExitCode;

fn main() -> ExitCode {
    treeconf_cli::run()
}
