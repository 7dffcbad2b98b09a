//! Android package names from code locations

/// Installed system apps whose paths do not follow the `/data/app` scheme
const SYSTEM_APPS: &[(&str, &str)] = &[
    ("/system_ext/priv-app/SystemUIGoogle/SystemUIGoogle.apk", "com.android.systemui"),
    ("/product/priv-app/Phonesky/Phonesky.apk", "com.android.vending"),
    ("/product/app/Maps/Maps.apk", "com.google.android.apps.maps"),
    (
        "/system_ext/priv-app/NexusLauncherRelease/NexusLauncherRelease.apk",
        "com.google.android.apps.nexuslauncher",
    ),
    ("/product/app/Photos/Photos.apk", "com.google.android.apps.photos"),
    (
        "/product/priv-app/WellbeingPrebuilt/WellbeingPrebuilt.apk",
        "com.google.android.apps.wellbeing",
    ),
    ("/product/app/PrebuiltGmail/PrebuiltGmail.apk", "com.google.android.gm"),
    ("/product/priv-app/PrebuiltGmsCore/PrebuiltGmsCore", "com.google.android.gms"),
    ("/product/priv-app/Velvet/Velvet.apk", "com.google.android.googlequicksearchbox"),
    (
        "/product/app/LatinIMEGooglePrebuilt/LatinIMEGooglePrebuilt.apk",
        "com.google.android.inputmethod.latin",
    ),
];

const DATA_APP: &str = "/data/app/";

/// Package synthesized for dex code loaded from an anonymous memfd
pub const MEMFD_PACKAGE: &str = "memfd";

/// Outcome of classifying a code location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLocation {
    /// The location belongs to this app package
    Known(String),

    /// An app location whose package could not be parsed
    Unparseable,

    /// Not an app location at all
    NotAnApp,
}

impl PackageLocation {
    pub fn package(&self) -> Option<&str> {
        match self {
            PackageLocation::Known(p) => Some(p),
            _ => None,
        }
    }
}

/// Classify `location` (an APK, odex or dex path) by owning app package.
pub fn package_from_location(location: &str) -> PackageLocation {
    for (prefix, package) in SYSTEM_APPS {
        if location.starts_with(prefix) {
            return PackageLocation::Known((*package).to_string());
        }
    }
    if location.contains("MatchMaker") {
        return PackageLocation::Known("com.google.android.as".to_string());
    }

    // In-memory dex files embed the original path:
    // "[anon:dalvik-classes.dex extracted in memory from /data/app/...]"
    let Some(pos) = location.find(DATA_APP) else {
        return PackageLocation::NotAnApp;
    };
    match package_from_app_path(&location[pos + DATA_APP.len()..]) {
        Some(package) => PackageLocation::Known(package.to_string()),
        None => PackageLocation::Unparseable,
    }
}

/// Package from the part of a path after `/data/app/`.
///
/// Newer installs nest the package directory inside a random
/// `~~<hash>==` directory: `~~ab==/com.pkg-cd==/base.apk`.
fn package_from_app_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/');
    let mut dir = segments.next()?;
    if dir.starts_with("~~") {
        dir = segments.next()?;
    }
    // The directory must be followed by at least one more component.
    segments.next()?;
    let (package, _hash) = dir.split_once('-')?;
    if package.is_empty() {
        return None;
    }
    Some(package)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(location: &str) -> Option<String> {
        package_from_location(location).package().map(str::to_string)
    }

    #[test]
    fn test_data_app_locations() {
        assert_eq!(
            known("/data/app/org.perfetto.test-6XfQhnaSkFwGK0sYL9is0G==/base.apk").as_deref(),
            Some("org.perfetto.test")
        );
        assert_eq!(
            known("/data/app/~~ASDFGH1234QWerT==/com.perfetto.test-MNBVCX7890SDTst6==/test.apk")
                .as_deref(),
            Some("com.perfetto.test")
        );
        assert_eq!(
            known("/data/app/com.google.android.apps.wellbeing-qfQCaB4uJ7P0OPpZQqOu0Q==/oat/arm64/base.odex")
                .as_deref(),
            Some("com.google.android.apps.wellbeing")
        );
        assert_eq!(
            known(
                "[anon:dalvik-classes.dex extracted in memory from \
                 /data/app/~~uUgHYtbjPNr2VFa3byIF4Q==/com.perfetto.example-aC94wTfXRC60l2HJU5YvjQ==/base.apk]"
            )
            .as_deref(),
            Some("com.perfetto.example")
        );
    }

    #[test]
    fn test_system_apps() {
        assert_eq!(
            known("/product/priv-app/Phonesky/Phonesky.apk").as_deref(),
            Some("com.android.vending")
        );
        assert_eq!(
            known("/system_ext/priv-app/MatchMakerPrebuilt/MatchMaker.apk").as_deref(),
            Some("com.google.android.as")
        );
        assert_eq!(
            known("/product/priv-app/PrebuiltGmsCore/PrebuiltGmsCoreSc.apk").as_deref(),
            Some("com.google.android.gms")
        );
    }

    #[test]
    fn test_unparseable_and_foreign() {
        assert_eq!(package_from_location("/data/app/nohash/base.apk"), PackageLocation::Unparseable);
        assert_eq!(package_from_location("/data/app/com.foo-abc"), PackageLocation::Unparseable);
        assert_eq!(package_from_location("/system/lib64/libc.so"), PackageLocation::NotAnApp);
    }
}
