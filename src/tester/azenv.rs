//! Parses AZenv-style `KEY = value` response bodies (ground:
//! `utils.py::parse_azevn`), consumed by the anonymity judge stage and by
//! the startup bootstrap that learns this host's own apparent address.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AzenvVars {
    pub remote_addr: Option<String>,
    pub x_unity_version: Option<String>,
    pub user_agent: Option<String>,
}

pub fn parse(body: &str) -> AzenvVars {
    let mut vars = AzenvVars::default();
    for line in body.lines() {
        if line.contains("REMOTE_ADDR") {
            vars.remote_addr = value_of(line);
        }
        if line.contains("X_UNITY_VERSION") {
            vars.x_unity_version = value_of(line);
        }
        if line.contains("USER_AGENT") {
            vars.user_agent = value_of(line);
        }
    }
    vars
}

fn value_of(line: &str) -> Option<String> {
    line.split_once(" = ").map(|(_, v)| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_variables() {
        let body = "REMOTE_ADDR = 1.2.3.4\nX_UNITY_VERSION = 2017.1.2f1\nUSER_AGENT = test-agent\nOTHER = ignored";
        let vars = parse(body);
        assert_eq!(vars.remote_addr.as_deref(), Some("1.2.3.4"));
        assert_eq!(vars.x_unity_version.as_deref(), Some("2017.1.2f1"));
        assert_eq!(vars.user_agent.as_deref(), Some("test-agent"));
    }

    #[test]
    fn missing_variables_are_none() {
        let vars = parse("HTTP_HOST = example.com");
        assert_eq!(vars, AzenvVars::default());
    }
}
