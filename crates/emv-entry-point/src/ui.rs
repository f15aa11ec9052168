//! User interface requests (EMV Book A, 7.1)

/// Standard message identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardMessage {
    Approved,
    NotAuthorised,
    EnterPin,
    ProcessingError,
    RemoveCard,
    Welcome,
    PresentCard,
    Processing,
    CardReadOkRemoveCard,
    InsertOrSwipeCard,
    PresentOneCardOnly,
    ApprovedPleaseSign,
    AuthorisingPleaseWait,
    /// "Insert, swipe or try another card"
    TryAnotherCard,
    InsertCard,
    ClearDisplay,
    SeePhone,
    PresentCardAgain,
}

impl StandardMessage {
    pub fn id(&self) -> u8 {
        match self {
            StandardMessage::Approved => 0x03,
            StandardMessage::NotAuthorised => 0x07,
            StandardMessage::EnterPin => 0x09,
            StandardMessage::ProcessingError => 0x0F,
            StandardMessage::RemoveCard => 0x10,
            StandardMessage::Welcome => 0x14,
            StandardMessage::PresentCard => 0x15,
            StandardMessage::Processing => 0x16,
            StandardMessage::CardReadOkRemoveCard => 0x17,
            StandardMessage::InsertOrSwipeCard => 0x18,
            StandardMessage::PresentOneCardOnly => 0x19,
            StandardMessage::ApprovedPleaseSign => 0x1A,
            StandardMessage::AuthorisingPleaseWait => 0x1B,
            StandardMessage::TryAnotherCard => 0x1C,
            StandardMessage::InsertCard => 0x1D,
            StandardMessage::ClearDisplay => 0x1E,
            StandardMessage::SeePhone => 0x20,
            StandardMessage::PresentCardAgain => 0x21,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        use StandardMessage::*;
        [
            Approved,
            NotAuthorised,
            EnterPin,
            ProcessingError,
            RemoveCard,
            Welcome,
            PresentCard,
            Processing,
            CardReadOkRemoveCard,
            InsertOrSwipeCard,
            PresentOneCardOnly,
            ApprovedPleaseSign,
            AuthorisingPleaseWait,
            TryAnotherCard,
            InsertCard,
            ClearDisplay,
            SeePhone,
            PresentCardAgain,
        ]
        .into_iter()
        .find(|m| m.id() == id)
    }
}

/// Reader status shown alongside a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactlessTransactionStatus {
    NotReady,
    Idle,
    ReadyToRead,
    Processing,
    CardReadSuccessfully,
    ProcessingError,
}

/// Qualifies the value shown with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueQualifier {
    Amount,
    Balance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInterfaceRequest {
    pub message: StandardMessage,
    pub status: ContactlessTransactionStatus,
    /// Display hold time in units of 100 ms
    pub hold_time: u16,
    pub language_preference: Option<String>,
    pub value_qualifier: Option<ValueQualifier>,
    pub value: i64,
    pub currency_code: Option<u16>,
}

impl UserInterfaceRequest {
    pub fn new(message: StandardMessage, status: ContactlessTransactionStatus) -> Self {
        Self {
            message,
            status,
            hold_time: 0,
            language_preference: None,
            value_qualifier: None,
            value: 0,
            currency_code: None,
        }
    }

    pub fn hold_time(mut self, hold_time: u16) -> Self {
        self.hold_time = hold_time;
        self
    }

    pub fn value(mut self, qualifier: ValueQualifier, value: i64, currency_code: u16) -> Self {
        self.value_qualifier = Some(qualifier);
        self.value = value;
        self.currency_code = Some(currency_code);
        self
    }
}
