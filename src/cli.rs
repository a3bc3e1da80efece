use clap::{Parser, Subcommand};
use std::path::PathBuf;
use transferbox::FileDescriptor;
use transferbox::jobs::HeadersMap;

#[derive(Parser, Debug)]
#[command(name = "transferbox")]
#[command(about = "Download and upload files over HTTP", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to config/transferbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a URL into a local file
    Download(DownloadArgs),
    /// Send files to a URL
    Upload(UploadArgs),
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    pub url: String,
    pub path: PathBuf,

    /// Request header as `Name: value`, repeatable
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Minimum milliseconds between progress events
    #[arg(long)]
    pub progress_interval: Option<u64>,

    /// Emit progress only on multiples of this percentage
    #[arg(long)]
    pub progress_divider: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    pub url: String,

    /// File as `field:name:path[:mime]`, repeatable
    #[arg(long = "file", short = 'f', required = true, value_parser = parse_file)]
    pub files: Vec<FileDescriptor>,

    /// Form field as `key=value`, repeatable
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Send raw file bytes instead of multipart/form-data
    #[arg(long)]
    pub binary: bool,

    /// POST, PUT or PATCH
    #[arg(long)]
    pub method: Option<String>,
}

pub fn headers_map(headers: Vec<(String, String)>) -> HeadersMap {
    headers.into_iter().collect()
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected `key=value`, got '{raw}'"))
}

fn parse_file(raw: &str) -> Result<FileDescriptor, String> {
    let parts: Vec<&str> = raw.splitn(4, ':').collect();
    match parts.as_slice() {
        [field, name, path] => Ok(FileDescriptor::new(*field, *name, path)),
        [field, name, path, mime] if !mime.is_empty() => {
            Ok(FileDescriptor::new(*field, *name, path).with_mime_type(*mime))
        }
        [field, name, path, _] => Ok(FileDescriptor::new(*field, *name, path)),
        _ => Err(format!("expected `field:name:path[:mime]`, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer x").unwrap(),
            ("Authorization".to_string(), "Bearer x".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_parse_file() {
        let file = parse_file("photo:a.png:/tmp/a.png").unwrap();
        assert_eq!(file.field_name, "photo");
        assert_eq!(file.file_path, PathBuf::from("/tmp/a.png"));
        assert_eq!(file.mime_type, None);

        let file = parse_file("doc:b.bin:/tmp/b.bin:application/x-thing").unwrap();
        assert_eq!(file.mime_type.as_deref(), Some("application/x-thing"));

        assert!(parse_file("only:two").is_err());
    }

    #[test]
    fn test_cli_parses_upload() {
        let cli = Cli::try_parse_from([
            "transferbox",
            "upload",
            "http://localhost/up",
            "--file",
            "f:a.txt:/tmp/a.txt",
            "--field",
            "k=v",
            "--binary",
        ])
        .unwrap();

        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.files.len(), 1);
                assert_eq!(args.fields, vec![("k".to_string(), "v".to_string())]);
                assert!(args.binary);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
