use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use crate::detail::{DetailTab, UnknownTab};
use crate::job::JobId;

/// Client-side page addresses: `/home` and `/dag/{name}/{tab}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Dag { name: JobId, tab: DetailTab },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("No page at '{0}'; expected /home or /dag/<name>/<tab>")]
    NotFound(String),

    #[error("{0}")]
    UnknownTab(#[from] UnknownTab),
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        match segments.as_slice() {
            [] | ["home"] => Ok(Route::Home),
            ["dag", name] => Ok(Route::Dag {
                name: JobId::from(*name),
                tab: DetailTab::default(),
            }),
            ["dag", name, tab] => Ok(Route::Dag {
                name: JobId::from(*name),
                tab: tab.parse()?,
            }),
            _ => Err(RouteError::NotFound(s.to_string())),
        }
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Home => f.write_str("/home"),
            Route::Dag { name, tab } => write!(f, "/dag/{name}/{tab}"),
        }
    }
}
