use std::env;
use std::fs;
use std::path::Path;

const GAME_CFG_NAME: &str = "game_config.toml";
const LOG_CFG_NAME: &str = "gamerunner.log.toml";

fn main() {
    let source_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = Path::new(&source_dir).join("config");
    let levels_path = Path::new(&source_dir).join("levels");

    // Navigate three levels up to the target directory.
    let out_path = Path::new(&out_dir)
        .parent()
        .and_then(|pth| pth.parent())
        .and_then(|pth| pth.parent())
        .expect("Failed navigating to the target directory");

    fs::copy(config_path.join(GAME_CFG_NAME), out_path.join(GAME_CFG_NAME))
        .unwrap_or_else(|_| panic!("Failed to copy {}", GAME_CFG_NAME));
    fs::copy(config_path.join(LOG_CFG_NAME), out_path.join(LOG_CFG_NAME))
        .unwrap_or_else(|_| panic!("Failed to copy {}", LOG_CFG_NAME));

    // Ship the bundled levels next to the binary as well.
    let out_levels = out_path.join("levels");
    fs::create_dir_all(&out_levels).expect("Failed creating levels directory");

    for entry in fs::read_dir(&levels_path).expect("Failed reading levels directory") {
        let entry = entry.expect("Failed reading levels entry");
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            let name = path.file_name().expect("level file name");
            fs::copy(&path, out_levels.join(name))
                .unwrap_or_else(|_| panic!("Failed to copy {:?}", name));
        }
    }
}
