use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;

use hcme_io::SimulatorSettings;

/// Launches the simulator through its gradle wrapper.
pub struct Launch {
    java: String,
    beam_dir: PathBuf,
    beam_conf: PathBuf,
    max_ram_gb: usize,
}

impl Launch {
    pub fn new(settings: &SimulatorSettings) -> Launch {
        Launch {
            java: settings.java.clone(),
            beam_dir: settings.beam_dir.clone(),
            beam_conf: settings.beam_conf.clone(),
            max_ram_gb: settings.max_ram_gb,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            format!(
                "-Dorg.gradle.appname={}",
                self.beam_dir.join("gradlew").display()
            ),
            "-classpath".to_string(),
            self.beam_dir
                .join("gradle/wrapper/gradle-wrapper.jar")
                .display()
                .to_string(),
            "org.gradle.wrapper.GradleWrapperMain".to_string(),
            ":run".to_string(),
            format!("-PappArgs=['--config', '{}']", self.beam_conf.display()),
            format!("-PmaxRAM={}", self.max_ram_gb),
        ]
    }

    pub fn run(&self) -> Result<()> {
        hcme_util::run_cmd(
            Command::new(&self.java)
                .args(self.args())
                .current_dir(&self.beam_dir),
        )
    }
}

impl fmt::Display for Launch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.java)?;
        for arg in self.args() {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
