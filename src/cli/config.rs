use crate::config::{find_store_path, resolve_model, StoreConfig, DEFAULT_MODEL, SUGGESTED_MODELS};

fn is_model_key(key: &str) -> bool {
    matches!(key, "model" | "embedding_model")
}

fn describe_model(label: &str, model: &str) {
    let (name, kind) = resolve_model(model);
    println!("{}: {}", label, model);
    if name != model {
        println!("  resolves to {}", name);
    }
    println!("  backend: {}", kind);
}

/// Run the config command
pub fn run_config(key: Option<&str>, value: Option<&str>, list_models: bool) -> Result<(), String> {
    if list_models {
        print_models();
        return Ok(());
    }

    let store = find_store_path().ok_or("No memory store here; run 'reverie init' to create one.")?;
    let mut config = StoreConfig::new(store);

    match (key, value) {
        (None, None) => show_all(&config),
        (Some(k), None) if is_model_key(k) => {
            describe_model("model", &config.embedding_model());
            Ok(())
        }
        (Some(k), None) => {
            let shown = config.get(k).unwrap_or_else(|| "(unset)".to_string());
            println!("{} = {}", k, shown);
            Ok(())
        }
        (Some(k), Some(v)) => set_value(&mut config, k, v),
        (None, Some(_)) => Err("A key is needed to set a value".to_string()),
    }
}

fn show_all(config: &StoreConfig) -> Result<(), String> {
    describe_model("embedding_model", &config.embedding_model());
    println!();

    let yaml =
        serde_yaml::to_string(&config.settings()).map_err(|e| format!("Failed to render settings: {}", e))?;
    print!("{}", yaml);
    Ok(())
}

fn set_value(config: &mut StoreConfig, key: &str, value: &str) -> Result<(), String> {
    let saved = if is_model_key(key) {
        let (name, kind) = resolve_model(value);
        if kind != "lite" {
            println!("Switching embeddings to {} ({})", name, kind);
            println!("Existing memories keep their old vectors until re-saved.");
        }
        config.set_embedding_model(value)
    } else {
        config.set(key, value)
    };

    saved.map_err(|e| format!("Failed to write config: {}", e))?;
    println!("{} = {}", key, value);
    Ok(())
}

fn print_models() {
    let current = match find_store_path() {
        Some(path) => StoreConfig::new(path).embedding_model(),
        None => DEFAULT_MODEL.to_string(),
    };

    println!("{:<3}{:<16}{:<9}{}", "", "ALIAS", "SIZE", "NOTES");
    for model in SUGGESTED_MODELS {
        let active = current == model.alias || current == model.name;
        println!(
            "{:<3}{:<16}{:<9}{}",
            if active { "*" } else { "" },
            model.alias,
            model.size,
            model.description
        );
    }
    println!("\nChange with: reverie config model <alias>");
}
