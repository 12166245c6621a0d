mod constraint;
mod form;
