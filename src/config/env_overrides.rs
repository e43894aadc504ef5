use super::Config;
use std::path::PathBuf;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(database) = std::env::var("SONGSMITH_DATABASE")
            && !database.is_empty()
        {
            self.database_file = database;
        }

        if let Ok(log_dir) = std::env::var("SONGSMITH_LOG_DIR")
            && !log_dir.is_empty()
        {
            self.log_dir = Some(PathBuf::from(log_dir));
        }

        if let Ok(prompts_dir) = std::env::var("SONGSMITH_PROMPTS_DIR")
            && !prompts_dir.is_empty()
        {
            self.prompts_dir = Some(PathBuf::from(prompts_dir));
        }

        if let Ok(port_str) =
            std::env::var("SONGSMITH_GATEWAY_PORT").or_else(|_| std::env::var("PORT"))
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.gateway.port = port;
        }

        if let Ok(host) =
            std::env::var("SONGSMITH_GATEWAY_HOST").or_else(|_| std::env::var("HOST"))
            && !host.is_empty()
        {
            self.gateway.host = host;
        }

        if let Ok(base) = std::env::var("OLLAMA_API_BASE")
            && !base.is_empty()
        {
            self.completion.ollama_base_url = Some(base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_env::EnvScope;

    #[test]
    fn env_overrides_replace_paths_and_gateway() {
        let mut env = EnvScope::lock();
        env.set("SONGSMITH_DATABASE", "/tmp/override.db")
            .set("SONGSMITH_GATEWAY_PORT", "4321")
            .set("SONGSMITH_GATEWAY_HOST", "0.0.0.0")
            .set("OLLAMA_API_BASE", "http://gpu-box:11434");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/override.db"));
        assert_eq!(config.gateway.port, 4321);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(
            config.completion.ollama_base_url.as_deref(),
            Some("http://gpu-box:11434")
        );
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut env = EnvScope::lock();
        env.set("SONGSMITH_GATEWAY_PORT", "not-a-port").unset("PORT");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn empty_values_do_not_override() {
        let mut env = EnvScope::lock();
        env.set("SONGSMITH_DATABASE", "").set("OLLAMA_API_BASE", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.database_file, "songsmith.db");
        assert!(config.completion.ollama_base_url.is_none());
    }
}
