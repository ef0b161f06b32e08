//! Runtime configuration.
//!
//! Every component takes its configuration explicitly; there are no ambient
//! globals. Values come from the environment (a `.env` file is honored by the
//! CLI entry point), with defaults matching the production deployment.

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub region: String,
    pub bucket: String,
    /// Key prefix under which report files live.
    pub reports_prefix: String,
    /// Key of the master roster spreadsheet (`Batch`/`Section`/`Name`).
    pub roster_key: String,
    /// Key of the generated student registry workbook.
    pub registry_key: String,
    /// Face collection identifier for indexed student photos.
    pub collection_id: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            region: env_or("AWS_REGION", "ap-south-1"),
            bucket: env_or("BUCKET_NAME", "ict-attendance"),
            reports_prefix: env_or("REPORTS_PREFIX", "reports/"),
            roster_key: env_or("ROSTER_KEY", "reports/students.xlsx"),
            registry_key: env_or("REGISTRY_KEY", "students.xlsx"),
            collection_id: env_or("FACE_COLLECTION_ID", "students"),
        }
    }

    /// Basename of the roster object, used to exclude it from report listings.
    pub fn roster_file_name(&self) -> &str {
        self.roster_key
            .rsplit('/')
            .next()
            .unwrap_or(&self.roster_key)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
