// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#[cfg(test)]
pub mod tests {
    use mitmcache_proxy::config::Config;
    use std::env;
    use std::fs::write;

    fn temp_config_path(filename: &str) -> String {
        let dir = env::temp_dir();
        dir.join(format!("mitmcache-proxy-test-{}-{filename}", std::process::id()))
            .to_string_lossy()
            .to_string()
    }

    #[test]
    fn loads_valid_config_with_defaults_applied() {
        let yaml = r#"
app_id: testapp
cache_capacity: 128
"#;
        let path = temp_config_path("valid.yaml");
        write(&path, yaml).unwrap();
        let config = Config::from_file(&path).expect("should parse valid config");

        assert_eq!(config.app_id, "testapp");
        assert_eq!(config.cache_capacity, 128);
        assert_eq!(config.listen_port, 3040);
        assert_eq!(config.admin_port, 3041);
        assert_eq!(config.max_entry_size_bytes, 16 * 1024 * 1024);
        assert_eq!(config.fetch_timeout_secs, 5);
        assert_eq!(config.fetch_retries, 3);
        assert_eq!(config.connect_deadline_secs, 5);
        assert_eq!(config.tls_cert_dir, "certs");
        assert_eq!(config.ca_cert_path, "mitmproxyCA.crt");
        assert_eq!(config.ca_key_path, "mitmproxyCA.key");
        assert!(config.classifier.is_none());
    }

    #[test]
    fn overrides_defaults_when_present() {
        let yaml = r#"
app_id: testapp
listen_port: 9090
admin_port: 9091
cache_capacity: 64
max_entry_size_bytes: 1048576
fetch_timeout_secs: 2
fetch_retries: 5
connect_deadline_secs: 3
tls_cert_dir: /tmp/certs
ca_cert_path: /tmp/ca.crt
ca_key_path: /tmp/ca.key
classifier:
  command: /usr/bin/classify
  args: ["--json"]
"#;
        let path = temp_config_path("overrides.yaml");
        write(&path, yaml).unwrap();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.listen_port, 9090);
        assert_eq!(config.admin_port, 9091);
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.max_entry_size_bytes, 1048576);
        assert_eq!(config.fetch_retries, 5);
        let classifier = config.classifier.expect("classifier should be set");
        assert_eq!(classifier.command, "/usr/bin/classify");
        assert_eq!(classifier.args, vec!["--json".to_string()]);
    }

    #[test]
    fn rejects_empty_app_id() {
        let yaml = "app_id: \"\"\ncache_capacity: 10\n";
        let path = temp_config_path("empty_app_id.yaml");
        write(&path, yaml).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn rejects_zero_cache_capacity() {
        let yaml = "app_id: testapp\ncache_capacity: 0\n";
        let path = temp_config_path("zero_capacity.yaml");
        write(&path, yaml).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn rejects_zero_fetch_retries() {
        let yaml = "app_id: testapp\ncache_capacity: 10\nfetch_retries: 0\n";
        let path = temp_config_path("zero_retries.yaml");
        write(&path, yaml).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn rejects_clashing_ports() {
        let yaml = "app_id: testapp\ncache_capacity: 10\nlisten_port: 3040\nadmin_port: 3040\n";
        let path = temp_config_path("clashing_ports.yaml");
        write(&path, yaml).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn rejects_nonexistent_file() {
        assert!(Config::from_file("/nonexistent/path/does-not-exist.yaml").is_err());
    }

    #[test]
    fn rejects_malformed_yaml() {
        let path = temp_config_path("malformed.yaml");
        write(&path, "app_id: test\n  - not valid yaml").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
