use std::{fs, fs::File, path::PathBuf};

use certus_pki::{CaConfig, CertificateAuthority, SigningMetadata};
use colored::Colorize;

use crate::error::{CliError, CliResult};

pub fn handle(
    config: CaConfig,
    file: PathBuf,
    serial: String,
    output: Option<PathBuf>,
    reason: Option<String>,
    location: Option<String>,
) -> CliResult<()> {
    println!("{}", format!("签名文件: {}", file.display()).cyan());

    if !file.exists() {
        return Err(CliError::FileNotFound(file.display().to_string()));
    }
    let size = fs::metadata(&file)?.len();
    println!("  文件大小: {size} 字节");

    let output = output.unwrap_or_else(|| {
        let mut name = file.clone().into_os_string();
        name.push(".sig.json");
        PathBuf::from(name)
    });
    if output == file {
        return Err(CliError::InvalidInput(format!("签名输出会覆盖原文件: {}", file.display())));
    }

    let ca = CertificateAuthority::open(config)?;
    println!("{}", "执行签名...".cyan());
    let metadata = SigningMetadata { reason, location };
    let record = ca.sign_reader(File::open(&file)?, &serial, metadata, None)?;
    fs::write(&output, record.to_json()?)?;

    println!("{} 签名已保存到: {}", "✓".green(), output.display());
    println!();
    println!("{}", "签名信息:".cyan());
    println!("  证书序列号: {}", record.signer_certificate_serial);
    println!("  算法: {}", record.signature_algorithm);
    println!(
        "  文档摘要: {} ({})",
        hex::encode(&record.document_digest),
        record.digest_algorithm.name()
    );
    if let Some(reason) = &record.reason {
        println!("  签名原因: {reason}");
    }
    if let Some(location) = &record.location {
        println!("  签名位置: {location}");
    }
    Ok(())
}
