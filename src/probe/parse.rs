//! Version banner parsing
//!
//! Pure functions over the text an interpreter prints for its version flag.
//! No process or filesystem access, so everything here is tested directly.

use crate::types::{RuntimeFamily, RuntimeFlavor};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_JAVA_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:openjdk|java) version ["']?(\d+(?:\.\d+)*(?:_\d+)?(?:-b\d+)?)["']?"#)
        .expect("valid java version regex")
});
static RE_JAVA_VERSION_LOOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:openjdk|java) (\d+(?:\.\d+)*)").expect("valid loose java regex"));
static RE_NODE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"v?(\d+\.\d+\.\d+)").expect("valid node version regex"));
static RE_DOTNET_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\d+\.\d+\.\d+)").expect("valid dotnet version regex"));

static RE_IBM_SEMERU: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IBM Semeru").expect("valid semeru regex"));
static RE_IBM_SDK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IBM (?:J9|SDK)").expect("valid ibm sdk regex"));

/// Join the two output channels in the order the runtime prints its banner.
///
/// The JVM writes `-version` to stderr; Node and .NET use stdout.
pub fn combine_output(family: RuntimeFamily, stdout: &str, stderr: &str) -> String {
    match family {
        RuntimeFamily::Java => format!("{stderr}{stdout}"),
        RuntimeFamily::Node | RuntimeFamily::DotNet => format!("{stdout}{stderr}"),
    }
}

/// Infer the JVM distribution. The first signature that matches wins.
pub fn detect_java_flavor(output: &str) -> RuntimeFlavor {
    if RE_IBM_SEMERU.is_match(output) {
        RuntimeFlavor::IbmSemeru
    } else if RE_IBM_SDK.is_match(output) {
        RuntimeFlavor::IbmJava
    } else if output.to_lowercase().contains("openjdk") {
        RuntimeFlavor::OpenJdk
    } else if output.contains("HotSpot") {
        RuntimeFlavor::HotSpot
    } else {
        RuntimeFlavor::Unknown
    }
}

/// Flavor for a family's banner. Only Java has distributions worth telling apart.
pub fn detect_flavor(family: RuntimeFamily, output: &str) -> RuntimeFlavor {
    match family {
        RuntimeFamily::Java => detect_java_flavor(output),
        RuntimeFamily::Node => RuntimeFlavor::NodeJs,
        RuntimeFamily::DotNet => RuntimeFlavor::DotNet,
    }
}

/// First version token in `output`, if any.
pub fn extract_version(family: RuntimeFamily, output: &str) -> Option<String> {
    let capture = |re: &Regex| {
        re.captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    match family {
        RuntimeFamily::Java => capture(&RE_JAVA_VERSION).or_else(|| capture(&RE_JAVA_VERSION_LOOSE)),
        RuntimeFamily::Node => capture(&RE_NODE_VERSION),
        RuntimeFamily::DotNet => capture(&RE_DOTNET_VERSION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEMURIN_8: &str = "openjdk version \"1.8.0_372\"\n\
        OpenJDK Runtime Environment (Temurin)(build 1.8.0_372-b07)\n\
        OpenJDK 64-Bit Server VM (Temurin)(build 25.372-b07, mixed mode)\n";

    const SEMERU_11: &str = "openjdk version \"11.0.19\" 2023-04-18\n\
        IBM Semeru Runtime Open Edition 11.0.19.0 (build 11.0.19+7)\n\
        Eclipse OpenJ9 VM 11.0.19.0 (build openj9-0.38.0, JRE 11 Linux amd64-64-Bit)\n";

    const IBM_JAVA_8: &str = "java version \"1.8.0_371\"\n\
        Java(TM) SE Runtime Environment (build 8.0.7.20 - pxa6480sr7fp20-20230330_01(SR7 FP20))\n\
        IBM J9 VM (build 2.9, JRE 1.8.0 Linux amd64-64-Bit Compressed References)\n";

    const ORACLE_8: &str = "java version \"1.8.0_202\"\n\
        Java(TM) SE Runtime Environment (build 1.8.0_202-b08)\n\
        Java HotSpot(TM) 64-Bit Server VM (build 25.202-b08, mixed mode)\n";

    #[test]
    fn java_flavors() {
        assert_eq!(detect_java_flavor(TEMURIN_8), RuntimeFlavor::OpenJdk);
        assert_eq!(detect_java_flavor(SEMERU_11), RuntimeFlavor::IbmSemeru);
        assert_eq!(detect_java_flavor(IBM_JAVA_8), RuntimeFlavor::IbmJava);
        assert_eq!(detect_java_flavor(ORACLE_8), RuntimeFlavor::HotSpot);
        assert_eq!(detect_java_flavor("exec format error"), RuntimeFlavor::Unknown);
    }

    #[test]
    fn semeru_outranks_openjdk_marker() {
        // Semeru banners also say "openjdk version".
        assert!(SEMERU_11.contains("openjdk"));
        assert_eq!(detect_flavor(RuntimeFamily::Java, SEMERU_11), RuntimeFlavor::IbmSemeru);
    }

    #[test]
    fn java_versions() {
        assert_eq!(extract_version(RuntimeFamily::Java, TEMURIN_8).as_deref(), Some("1.8.0_372"));
        assert_eq!(extract_version(RuntimeFamily::Java, SEMERU_11).as_deref(), Some("11.0.19"));
        assert_eq!(extract_version(RuntimeFamily::Java, "openjdk version '17.0.2'").as_deref(), Some("17.0.2"));
        assert_eq!(
            extract_version(RuntimeFamily::Java, "java version \"1.8.0_131-b11\"").as_deref(),
            Some("1.8.0_131-b11")
        );
    }

    #[test]
    fn java_loose_form() {
        let output = "openjdk 21.0.1 2023-10-17 LTS\nOpenJDK Runtime Environment";
        assert_eq!(extract_version(RuntimeFamily::Java, output).as_deref(), Some("21.0.1"));
    }

    #[test]
    fn node_versions() {
        assert_eq!(extract_version(RuntimeFamily::Node, "v20.3.0\n").as_deref(), Some("20.3.0"));
        assert_eq!(extract_version(RuntimeFamily::Node, "18.17.1").as_deref(), Some("18.17.1"));
        assert_eq!(extract_version(RuntimeFamily::Node, "v20\n"), None);
    }

    #[test]
    fn dotnet_version_is_line_anchored() {
        let output = "Welcome to .NET 8.0!\n8.0.122\n";
        assert_eq!(extract_version(RuntimeFamily::DotNet, output).as_deref(), Some("8.0.122"));
        assert_eq!(extract_version(RuntimeFamily::DotNet, "Host version 6.0.1"), None);
    }

    #[test]
    fn channel_order() {
        assert_eq!(combine_output(RuntimeFamily::Java, "out", "err"), "errout");
        assert_eq!(combine_output(RuntimeFamily::Node, "out", "err"), "outerr");
        assert_eq!(combine_output(RuntimeFamily::DotNet, "out", "err"), "outerr");
    }

    #[test]
    fn non_java_flavors_are_fixed() {
        assert_eq!(detect_flavor(RuntimeFamily::Node, TEMURIN_8), RuntimeFlavor::NodeJs);
        assert_eq!(detect_flavor(RuntimeFamily::DotNet, ""), RuntimeFlavor::DotNet);
    }

    proptest! {
        #[test]
        fn digitless_output_has_no_version(output in "[^0-9]*") {
            for family in RuntimeFamily::ALL {
                prop_assert_eq!(extract_version(family, &output), None);
            }
        }

        #[test]
        fn node_banner_roundtrips(major in 0u32..100, minor in 0u32..100, patch in 0u32..1000) {
            let banner = format!("v{major}.{minor}.{patch}\n");
            let expected = format!("{major}.{minor}.{patch}");
            prop_assert_eq!(extract_version(RuntimeFamily::Node, &banner), Some(expected));
        }
    }
}
