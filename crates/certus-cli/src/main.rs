//! Certus 证书颁发机构命令行工具

mod commands;
mod error;

use std::path::PathBuf;

use certus_pki::CaConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;
use error::CliResult;

#[derive(Parser)]
#[command(name = "certus")]
#[command(about = "Certus 证书颁发机构 - 证书签发、文档签名与验证")]
#[command(version)]
struct Cli {
    /// 配置文件路径 (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 数据目录，覆盖配置文件中的设置
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化 CA（生成根密钥和根证书）
    Init {
        /// 根证书通用名称
        #[arg(long)]
        common_name: Option<String>,

        /// 组织
        #[arg(long)]
        organization: Option<String>,

        /// 国家代码（两个字母）
        #[arg(long)]
        country: Option<String>,

        /// 密钥算法 (ecdsa-p256-sha256 或 ed25519)
        #[arg(short, long)]
        algorithm: Option<String>,
    },

    /// 显示 CA 信息
    Info {
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 签发证书（由 CA 生成并保管私钥）
    Issue {
        /// 通用名称 (CN)
        #[arg(long)]
        common_name: String,

        /// 组织 (O)
        #[arg(long)]
        organization: Option<String>,

        /// 组织单位 (OU)
        #[arg(long)]
        organizational_unit: Option<String>,

        /// 国家 (C)
        #[arg(long)]
        country: Option<String>,

        /// 省/州 (ST)
        #[arg(long)]
        state: Option<String>,

        /// 城市 (L)
        #[arg(long)]
        locality: Option<String>,

        /// 邮箱
        #[arg(long)]
        email: Option<String>,

        /// 主体备用名称，可重复 (dns:/email:/ip: 前缀可选)
        #[arg(long = "san")]
        subject_alt_names: Vec<String>,

        /// 有效期（天）
        #[arg(short, long)]
        days: Option<u32>,

        /// 证书 PEM 输出路径
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 根据 CSR 签发证书
    IssueCsr {
        /// CSR 文件路径 (PEM)
        #[arg(long)]
        csr: PathBuf,

        /// 有效期（天）
        #[arg(short, long)]
        days: Option<u32>,

        /// 证书 PEM 输出路径
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 按序列号查看证书
    Show {
        /// 证书序列号（十六进制）
        serial: String,

        /// 输出 PEM
        #[arg(long)]
        pem: bool,
    },

    /// 列出证书
    List {
        /// 包含已撤销和已过期的证书
        #[arg(short, long)]
        all: bool,
    },

    /// 撤销证书
    Revoke {
        /// 证书序列号（十六进制）
        serial: String,

        /// 撤销原因
        #[arg(short, long, default_value = "unspecified")]
        reason: String,
    },

    /// 使用证书私钥签名文件
    Sign {
        /// 要签名的文件路径
        #[arg(short, long)]
        file: PathBuf,

        /// 签名证书序列号（十六进制）
        #[arg(short, long)]
        serial: String,

        /// 签名记录输出文件
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 签名原因
        #[arg(long)]
        reason: Option<String>,

        /// 签名位置
        #[arg(long)]
        location: Option<String>,
    },

    /// 验证文件签名
    Verify {
        /// 要验证的文件路径
        #[arg(short, long)]
        file: PathBuf,

        /// 签名记录文件路径
        #[arg(short, long)]
        signature: PathBuf,
    },

    /// 检查证书是否由本 CA 签发且有效
    CheckCert {
        /// 证书文件路径 (PEM)
        #[arg(long)]
        cert: PathBuf,
    },

    /// 轮换 CA 根密钥
    Rotate,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", "✗".red(), e.to_string().red());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::Init {
            common_name,
            organization,
            country,
            algorithm,
        } => commands::init::handle(config, common_name, organization, country, algorithm),
        Commands::Info { json } => commands::info::handle(config, json),
        Commands::Issue {
            common_name,
            organization,
            organizational_unit,
            country,
            state,
            locality,
            email,
            subject_alt_names,
            days,
            output,
        } => {
            let mut request = certus_pki::CertificateRequest::new(common_name);
            request.subject.organization = organization;
            request.subject.organizational_unit = organizational_unit;
            request.subject.country = country;
            request.subject.state = state;
            request.subject.locality = locality;
            request.subject.email = email;
            request.subject_alt_names = subject_alt_names;
            request.validity_days = days;
            commands::issue::handle(config, request, output)
        }
        Commands::IssueCsr { csr, days, output } => {
            commands::issue_csr::handle(config, csr, days, output)
        }
        Commands::Show { serial, pem } => commands::show::handle(config, serial, pem),
        Commands::List { all } => commands::list::handle(config, all),
        Commands::Revoke { serial, reason } => commands::revoke::handle(config, serial, reason),
        Commands::Sign {
            file,
            serial,
            output,
            reason,
            location,
        } => commands::sign::handle(config, file, serial, output, reason, location),
        Commands::Verify { file, signature } => commands::verify::handle(config, file, signature),
        Commands::CheckCert { cert } => commands::check_cert::handle(config, cert),
        Commands::Rotate => commands::rotate::handle(config),
    }
}

fn load_config(path: Option<PathBuf>, data_dir: Option<PathBuf>) -> CliResult<CaConfig> {
    let mut config = match path {
        Some(path) => CaConfig::load(path)?,
        None => CaConfig::default(),
    };
    if let Some(data_dir) = data_dir {
        config.storage.data_dir = data_dir;
    }
    tracing::debug!(data_dir = %config.storage.data_dir.display(), "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::error::CliError;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_issue_with_sans() {
        let cli = Cli::try_parse_from([
            "certus",
            "--data-dir",
            "/tmp/ca",
            "issue",
            "--common-name",
            "example.com",
            "--san",
            "example.com",
            "--san",
            "ip:10.0.0.1",
            "--days",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ca")));
        match cli.command {
            Commands::Issue {
                common_name,
                subject_alt_names,
                days,
                ..
            } => {
                assert_eq!(common_name, "example.com");
                assert_eq!(subject_alt_names, vec!["example.com", "ip:10.0.0.1"]);
                assert_eq!(days, Some(30));
            }
            _ => panic!("expected issue command"),
        }
    }

    #[test]
    fn test_data_dir_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certus.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/srv/certus\"\n").unwrap();

        let config = load_config(Some(path.clone()), None).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/certus"));

        let config = load_config(Some(path), Some(PathBuf::from("/elsewhere"))).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_sign_refuses_to_overwrite_document() {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("contract.txt");
        std::fs::write(&document, b"terms").unwrap();

        let mut config = CaConfig::default();
        config.storage.data_dir = dir.path().join("ca");
        let result = commands::sign::handle(
            config,
            document.clone(),
            "01".to_string(),
            Some(document.clone()),
            None,
            None,
        );
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
        assert_eq!(std::fs::read(&document).unwrap(), b"terms");
    }
}
