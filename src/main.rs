use std::ffi::OsString;
use anyhow::{Context, Result};
use yggdrasil_proxy::classify::DEBUG_MARKER;
use yggdrasil_proxy::utils::{ensure_dir_exists, get_data_dir, APP_NAME};
use yggdrasil_proxy::{logs, App};

#[tokio::main]
async fn main() {
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    logs::init(args.iter().any(|a| a.to_str() == Some(DEBUG_MARKER)));

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[{}] {:#}", APP_NAME, e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Vec<OsString>) -> Result<i32> {
    let data_dir = get_data_dir().context("cannot resolve data directory")?;
    ensure_dir_exists(&data_dir).with_context(|| format!("cannot create {}", data_dir.display()))?;

    let mut app = App::from_data_dir(&data_dir).context("failed to initialize")?;
    Ok(app.run(args).await)
}
