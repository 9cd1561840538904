use std::path::PathBuf;

const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf";

#[derive(Clone, Debug)]
pub struct Config {
    pub templates_folder: PathBuf,
    pub output_folder: PathBuf,
    /// TrueType font used for raster certificates. When it cannot be loaded
    /// the built-in bitmap font is used instead.
    pub font_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let templates_folder = base_dir.join(
            std::env::var("TEMPLATES_FOLDER").unwrap_or_else(|_| "templates".to_string()),
        );
        let output_folder = base_dir.join(
            std::env::var("OUTPUT_FOLDER").unwrap_or_else(|_| "certificados_generados".to_string()),
        );

        let font_path = match std::env::var("CERT_FONT_PATH") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from(DEFAULT_FONT_PATH)),
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        let max_upload_mb: usize = std::env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "25".to_string())
            .parse()
            .map_err(|_| "MAX_UPLOAD_MB must be a positive integer")?;
        if max_upload_mb == 0 {
            return Err("MAX_UPLOAD_MB must be a positive integer".into());
        }

        Ok(Self {
            templates_folder,
            output_folder,
            font_path,
            host,
            port,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}
