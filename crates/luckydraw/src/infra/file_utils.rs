use log::info;
use std::{fs, io, path::Path};

/// Creates the data folder and any missing parents
pub fn create_folder(root_path: &str) -> Result<(), io::Error> {
    let path = Path::new(root_path);
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created data folder {}", root_path);
    }
    Ok(())
}
