pub(crate) mod html;
pub(crate) mod lock;
