//! Device class detection.
//!
//! The gallery picks its camera from a single probe of the host's user agent.
//! The rules follow the widely used `is-mobile` matcher: a phone token (and no
//! `CrOS`) means mobile, and with `tablet` enabled Android/iPad/PlayBook/Silk
//! agents count as mobile too. Touch-capable Macs reporting a desktop Safari
//! agent (iPadOS 13+) are caught with `feature_detect`.

use crate::window::WindowService;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

impl DeviceClass {
    /// Probe the host once. Hosts without a user agent are desktops.
    pub fn detect(window: &WindowService, options: MobileOptions) -> Self {
        let host = window.window();
        let mobile = host
            .user_agent()
            .is_some_and(|ua| is_mobile(&ua, host.max_touch_points(), options));
        let class = if mobile {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        };
        log::info!("Detected device class {:?}", class);
        class
    }

    pub fn is_mobile(self) -> bool {
        self == DeviceClass::Mobile
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MobileOptions {
    pub tablet: bool,
    pub feature_detect: bool,
}

impl MobileOptions {
    /// Phones and tablets.
    pub fn with_tablets() -> Self {
        Self {
            tablet: true,
            feature_detect: true,
        }
    }
}

const MOBILE_TOKENS: &[&str] = &[
    "armv7l",
    "avantgo",
    "bada/",
    "blackberry",
    "blazer",
    "compal",
    "elaine",
    "fennec",
    "hiptop",
    "iemobile",
    "iphone",
    "ipod",
    "iris",
    "kindle",
    "lge ",
    "maemo",
    "midp",
    "mmp",
    "netfront",
    "opera mobi",
    "opera mini",
    "palm",
    "phone",
    "pixi/",
    "pre/",
    "plucker",
    "pocket",
    "psp",
    "series40",
    "series60",
    "symbian",
    "treo",
    "up.browser",
    "up.link",
    "vodafone",
    "wap",
    "windows ce",
    "windows phone",
    "xda",
    "xiino",
];

const TABLET_TOKENS: &[&str] = &["android", "ipad", "playbook", "silk"];

/// `true` if some occurrence of `first` is followed (after at least `gap`
/// characters) by `second`.
fn followed_by(ua: &str, first: &str, gap: usize, second: &str) -> bool {
    ua.match_indices(first).any(|(idx, _)| {
        let rest = idx + first.len() + gap;
        ua.get(rest..).is_some_and(|tail| tail.contains(second))
    })
}

/// `bb` directly followed by at least one digit, e.g. `bb10`.
fn bb_index(ua: &str) -> Option<usize> {
    ua.match_indices("bb").find_map(|(idx, _)| {
        let digits = ua[idx + 2..]
            .chars()
            .take_while(char::is_ascii_digit)
            .count();
        (digits > 0).then_some(idx + 2 + digits)
    })
}

fn matches_mobile(ua: &str) -> bool {
    let platform_mobile = ["android", "meego"]
        .iter()
        .any(|platform| followed_by(ua, platform, 1, "mobile"))
        || bb_index(ua).is_some_and(|end| ua.get(end + 1..).is_some_and(|t| t.contains("mobile")));

    platform_mobile
        || MOBILE_TOKENS.iter().any(|token| ua.contains(token))
        || followed_by(ua, "mobile", 1, "firefox")
        || followed_by(ua, "samsungbrowser", 0, "mobile")
}

pub fn is_mobile(user_agent: &str, max_touch_points: u32, options: MobileOptions) -> bool {
    let ua = user_agent.to_lowercase();
    let mut result = (matches_mobile(&ua) && !user_agent.contains("CrOS"))
        || (options.tablet && TABLET_TOKENS.iter().any(|token| ua.contains(token)));

    if !result
        && options.tablet
        && options.feature_detect
        && max_touch_points > 1
        && user_agent.contains("Macintosh")
        && user_agent.contains("Safari")
    {
        result = true;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 12_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";
    const DESKTOP_SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
    const DESKTOP_FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";
    const CHROMEBOOK: &str = "Mozilla/5.0 (X11; CrOS x86_64 14541.0.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

    #[test]
    fn phones_are_mobile() {
        assert!(is_mobile(IPHONE, 5, MobileOptions::default()));
        assert!(is_mobile(ANDROID_PHONE, 5, MobileOptions::default()));
    }

    #[test]
    fn tablets_only_count_when_requested() {
        assert!(!is_mobile(ANDROID_TABLET, 5, MobileOptions::default()));
        assert!(is_mobile(ANDROID_TABLET, 5, MobileOptions::with_tablets()));
        assert!(is_mobile(IPAD, 5, MobileOptions::with_tablets()));
    }

    #[test]
    fn desktops_are_not_mobile() {
        assert!(!is_mobile(DESKTOP_FIREFOX, 0, MobileOptions::with_tablets()));
        assert!(!is_mobile(DESKTOP_SAFARI, 0, MobileOptions::with_tablets()));
        assert!(!is_mobile(CHROMEBOOK, 10, MobileOptions::with_tablets()));
    }

    #[test]
    fn touch_macs_are_ipads() {
        assert!(is_mobile(DESKTOP_SAFARI, 5, MobileOptions::with_tablets()));
        let no_detect = MobileOptions {
            tablet: true,
            feature_detect: false,
        };
        assert!(!is_mobile(DESKTOP_SAFARI, 5, no_detect));
    }

    #[test]
    fn blackberry_ten_is_mobile() {
        let ua = "Mozilla/5.0 (BB10; Touch) AppleWebKit/537.35+ (KHTML, like Gecko) Version/10.3.3.2205 Mobile Safari/537.35+";
        assert!(is_mobile(ua, 0, MobileOptions::default()));
    }

    #[test]
    fn hosts_without_user_agent_are_desktops() {
        let window = WindowService::new();
        assert_eq!(
            DeviceClass::detect(&window, MobileOptions::with_tablets()),
            DeviceClass::Desktop
        );
    }
}
