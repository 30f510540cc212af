use inquire::{error::InquireError, Confirm};

type InputResult<T> = Result<T, InquireError>;

pub fn confirm() -> InputResult<bool> {
    Confirm::new("Confirm").with_default(true).prompt()
}
