//! Deterministic build-recipe rendering for one environment specification.

use crate::core::env_spec::EnvSpec;

/// Render the Dockerfile for `spec`, copying and running `entry_file`.
///
/// One install step per package, in specification order: install order is
/// load-bearing for packages with native load-time side effects.
pub fn render(spec: &EnvSpec, entry_file: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("FROM python:{}\n", spec.runtime_version));
    out.push_str("WORKDIR /app\n");
    out.push_str("RUN [\"pip\",\"install\",\"--upgrade\",\"pip\"]\n");
    for entry in spec.packages.iter() {
        let requirement = match &entry.version {
            Some(version) => format!("{}=={}", entry.name, version),
            None => entry.name.clone(),
        };
        out.push_str(&format!(
            "RUN [\"pip\",\"install\",\"--trusted-host\",\"pypi.python.org\",\"--default-timeout=100\",\"{requirement}\"]\n"
        ));
    }
    out.push_str(&format!("COPY {entry_file} /app\n"));
    out.push_str(&format!("CMD [\"python\", \"/app/{entry_file}\"]\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_install_steps_in_specification_order() {
        let mut spec = EnvSpec::new("3.9");
        spec.packages.pin("numpy", Some("1.19.5".to_string()));
        spec.packages.pin("scipy", Some("1.5.4".to_string()));

        let rendered = render(&spec, "snippet.py");
        let numpy = rendered.find("numpy==1.19.5").expect("numpy step");
        let scipy = rendered.find("scipy==1.5.4").expect("scipy step");
        assert!(numpy < scipy, "install order must follow the specification");
        assert!(rendered.starts_with("FROM python:3.9\n"));
        assert!(rendered.ends_with("CMD [\"python\", \"/app/snippet.py\"]\n"));
    }

    #[test]
    fn unpinned_packages_render_without_a_version() {
        let mut spec = EnvSpec::new("3.8");
        spec.packages.pin("requests", None);

        let rendered = render(&spec, "snippet.py");
        assert!(rendered.contains("\"requests\"]"));
        assert!(!rendered.contains("requests=="));
    }
}
