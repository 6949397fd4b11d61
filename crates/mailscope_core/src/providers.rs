//! Static provider knowledge: trusted mailbox providers, free providers,
//! DKIM selector candidates and role-account names.

/// Large providers whose mail infrastructure is known to be sound.
///
/// SMTP probing against these is unreliable (greylisting, tarpits, blanket
/// RCPT acceptance), so they receive full SMTP and DKIM credit without any
/// network traffic.
pub const TRUSTED_PROVIDERS: &[&str] = &[
    // Google
    "gmail.com", "googlemail.com",
    // Microsoft
    "outlook.com", "hotmail.com", "live.com", "msn.com",
    "hotmail.co.uk", "outlook.fr", "live.co.uk",
    // Yahoo
    "yahoo.com", "ymail.com", "rocketmail.com", "yahoo.co.uk", "yahoo.fr",
    // Apple
    "icloud.com", "me.com", "mac.com",
    // Privacy-focused
    "protonmail.com", "proton.me", "pm.me", "tutanota.com", "tuta.io",
    // Others
    "zoho.com", "zohomail.com", "aol.com", "fastmail.com", "gmx.com", "gmx.de",
    "mail.com", "yandex.com", "yandex.ru",
];

/// Consumer mailbox providers handing out free addresses
pub const FREE_PROVIDERS: &[&str] = &[
    "gmail.com", "googlemail.com", "outlook.com", "hotmail.com", "live.com",
    "msn.com", "yahoo.com", "ymail.com", "rocketmail.com", "icloud.com",
    "me.com", "mac.com", "aol.com", "protonmail.com", "proton.me", "pm.me",
    "tutanota.com", "tuta.io", "zoho.com", "zohomail.com", "gmx.com", "gmx.de",
    "web.de", "mail.com", "yandex.com", "yandex.ru", "mail.ru", "qq.com",
    "163.com", "126.com", "naver.com", "daum.net", "libero.it", "orange.fr",
    "free.fr", "laposte.net", "t-online.de", "rediffmail.com",
];

/// DKIM selectors tried in order when racing `<selector>._domainkey.<domain>`
pub const DKIM_SELECTORS: &[&str] = &[
    // Common defaults
    "default", "dkim", "mail", "email", "selector", "key1", "key2",
    // Google Workspace
    "google", "google2048",
    // Microsoft 365
    "selector1", "selector2",
    // Generic rotations
    "s1", "s2", "k1", "k2", "k3", "smtp", "mx", "dk",
    // Third-party senders
    "mandrill", "mailjet", "sendgrid", "smtpapi", "pm", "mxvault",
    "amazonses", "zendesk1", "zendesk2", "cm", "everlytickey1",
    "everlytickey2", "mailchimp", "sparkpost", "scph0920", "fm1", "fm2",
    "protonmail", "zoho", "sig1",
];

/// Local parts that address a function rather than a person
pub const ROLE_ACCOUNTS: &[&str] = &[
    "abuse", "admin", "administrator", "billing", "contact", "help", "hello",
    "hostmaster", "info", "mail", "marketing", "no-reply", "noreply",
    "office", "postmaster", "root", "sales", "security", "support", "team",
    "webmaster",
];

pub fn is_trusted_provider(domain: &str) -> bool {
    TRUSTED_PROVIDERS.contains(&domain)
}

pub fn is_free_provider(domain: &str) -> bool {
    FREE_PROVIDERS.contains(&domain)
}

pub fn is_role_account(local_part: &str) -> bool {
    // "support+billing" and "info.team" still address a role
    let base = local_part
        .split(['+', '.'])
        .next()
        .unwrap_or(local_part);
    ROLE_ACCOUNTS.contains(&base)
}
