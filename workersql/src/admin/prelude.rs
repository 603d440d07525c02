pub(crate) use super::row::named_row;
pub(crate) use super::AdminContext;
pub(crate) use super::Command;
pub(crate) use super::Error;
pub(crate) use crate::backend::Row;
pub(crate) use async_trait::async_trait;
