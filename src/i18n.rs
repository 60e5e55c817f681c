use std::{convert::Infallible, fmt, str::FromStr};

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Name of the cookie holding the last selected interface language.
pub const LOCALE_COOKIE: &str = "locale";

const LOCALE_COOKIE_MAX_AGE: u64 = 60 * 60 * 24 * 365;

/// Locale
///
/// Interface languages supported by the client. English is the fallback for anything
/// unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Locale {
    #[default]
    En,
    Ru,
    Be,
}

/// LocaleInfo
///
/// Entry of the language picker.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct LocaleInfo {
    pub code: Locale,
    pub name: String,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::En, Locale::Ru, Locale::Be];

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ru => "ru",
            Locale::Be => "be",
        }
    }

    /// Native display name of the language.
    pub fn native_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Ru => "Русский",
            Locale::Be => "Беларуская",
        }
    }

    pub fn supported() -> Vec<LocaleInfo> {
        Self::ALL
            .iter()
            .map(|&code| LocaleInfo {
                code,
                name: code.native_name().to_string(),
            })
            .collect()
    }

    /// from_headers
    ///
    /// Resolves the caller's locale: the `locale` cookie wins, then the first supported
    /// language in `Accept-Language`, then English.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some(locale) = cookie_value(headers, LOCALE_COOKIE).and_then(|v| v.parse().ok()) {
            return locale;
        }

        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok())
            .and_then(|accept| {
                accept
                    .split(',')
                    .filter_map(|entry| entry.split(';').next())
                    .filter_map(|tag| tag.trim().split('-').next())
                    .find_map(|primary| primary.parse().ok())
            })
            .unwrap_or_default()
    }

    /// Set-Cookie value persisting this locale for a year.
    pub fn cookie(self) -> String {
        format!(
            "{LOCALE_COOKIE}={}; Path=/; Max-Age={LOCALE_COOKIE_MAX_AGE}; SameSite=Lax",
            self.code()
        )
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnsupportedLocale(pub String);

impl FromStr for Locale {
    type Err = UnsupportedLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "ru" => Ok(Locale::Ru),
            "be" => Ok(Locale::Be),
            other => Err(UnsupportedLocale(other.to_string())),
        }
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Locale::from_headers(&parts.headers))
    }
}

/// Reads a single cookie from the `Cookie` header(s).
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Message
///
/// User-visible messages that the API localizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    GenericFailure,
    Unexpected,
    NotAuthenticated,
    LandmarkNotFound,
    InvalidRating,
    MalformedPayload,
    ServiceUnavailable,
}

impl Message {
    pub fn text(self, locale: Locale) -> &'static str {
        use Message::*;
        match locale {
            Locale::En => match self {
                EmailAlreadyInUse => "This email is already registered.",
                InvalidEmail => "Please enter a valid email address.",
                WeakPassword => "Password should be at least 6 symbols",
                UserNotFound => "No account found with this email.",
                WrongPassword => "Incorrect password.",
                TooManyRequests => "Too many attempts. Please try again later.",
                GenericFailure => "An error occurred. Please try again.",
                Unexpected => "An unexpected error occurred.",
                NotAuthenticated => "User not authenticated",
                LandmarkNotFound => "Landmark not found",
                InvalidRating => "Rating must be between 1 and 5",
                MalformedPayload => "The request could not be understood.",
                ServiceUnavailable => "The service is temporarily unavailable. Please try again later.",
            },
            Locale::Ru => match self {
                EmailAlreadyInUse => "Этот email уже зарегистрирован.",
                InvalidEmail => "Введите корректный адрес электронной почты.",
                WeakPassword => "Пароль должен содержать не менее 6 символов",
                UserNotFound => "Аккаунт с таким email не найден.",
                WrongPassword => "Неверный пароль.",
                TooManyRequests => "Слишком много попыток. Попробуйте позже.",
                GenericFailure => "Произошла ошибка. Попробуйте ещё раз.",
                Unexpected => "Произошла непредвиденная ошибка.",
                NotAuthenticated => "Пользователь не авторизован",
                LandmarkNotFound => "Достопримечательность не найдена",
                InvalidRating => "Оценка должна быть от 1 до 5",
                MalformedPayload => "Некорректные данные запроса.",
                ServiceUnavailable => "Сервис временно недоступен. Попробуйте позже.",
            },
            Locale::Be => match self {
                EmailAlreadyInUse => "Гэты email ужо зарэгістраваны.",
                InvalidEmail => "Увядзіце карэктны адрас электроннай пошты.",
                WeakPassword => "Пароль павінен змяшчаць не менш за 6 сімвалаў",
                UserNotFound => "Акаўнт з такім email не знойдзены.",
                WrongPassword => "Няправільны пароль.",
                TooManyRequests => "Занадта шмат спроб. Паспрабуйце пазней.",
                GenericFailure => "Адбылася памылка. Паспрабуйце яшчэ раз.",
                Unexpected => "Адбылася нечаканая памылка.",
                NotAuthenticated => "Карыстальнік не аўтарызаваны",
                LandmarkNotFound => "Славутасць не знойдзена",
                InvalidRating => "Ацэнка павінна быць ад 1 да 5",
                MalformedPayload => "Некарэктныя даныя запыту.",
                ServiceUnavailable => "Сэрвіс часова недаступны. Паспрабуйце пазней.",
            },
        }
    }
}
