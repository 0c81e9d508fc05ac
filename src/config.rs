use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{Array, DocumentMut, value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    /// Orders cannot be saved without an expected delivery date.
    #[serde(default)]
    pub require_delivery_date: bool,
    #[serde(default = "default_true")]
    pub enable_smart_import: bool,
    #[serde(default)]
    pub supplier_options: Vec<String>,
}

fn default_db_path() -> String {
    "orders/orders.db".to_string()
}

fn default_catalog_path() -> String {
    "catalog.json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            catalog_path: default_catalog_path(),
            require_delivery_date: false,
            enable_smart_import: true,
            supplier_options: Vec::new(),
        }
    }
}

impl Config {
    /// Load the config, or defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Append a supplier to `supplier_options`, keeping the rest of the
    /// file as written. Returns false if it was already listed.
    pub fn add_supplier_option(
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        if doc.get("supplier_options").is_none() {
            doc["supplier_options"] = value(Array::new());
        }
        let options = doc["supplier_options"]
            .as_array_mut()
            .ok_or("supplier_options must be an array")?;

        if options.iter().any(|v| v.as_str() == Some(name)) {
            return Ok(false);
        }
        options.push(name);

        fs::write(path, doc.to_string())?;
        info!(supplier = %name, "Supplier option added");
        Ok(true)
    }
}
