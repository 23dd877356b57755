use candle_groom::{
    batch_config_from_env, compress_directory, init_logging, log_app_finish, log_app_start,
    logging_config_from_env,
};

const APP: &str = "compress_data";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(APP, &logging_cfg);

    let cfg = batch_config_from_env();
    let report = compress_directory(&cfg)?;
    log_app_finish(APP, &report);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed() > 0 {
        return Err(format!(
            "{} of {} files in {} failed to compress into {}",
            report.failed(),
            report.files.len(),
            cfg.input_dir.display(),
            cfg.output_dir.display()
        )
        .into());
    }
    Ok(())
}
