//! PC/SC reader discovery for the contactless field

use crate::pcsc_transceiver::PcscTransceiver;
use pcsc::{Context, Protocols, Scope, ShareMode};
use std::ffi::CString;

/// PC/SC context handing out [`PcscTransceiver`]s
pub struct CardReader {
    context: Context,
}

impl CardReader {
    pub fn new() -> Result<Self, pcsc::Error> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    fn reader_names(&self) -> Result<Vec<CString>, pcsc::Error> {
        let len = self.context.list_readers_len()?;
        let mut buf = vec![0; len];
        Ok(self.context.list_readers(&mut buf)?.map(CString::from).collect())
    }

    /// Names of the attached readers, in PC/SC order
    pub fn list_readers(&self) -> Result<Vec<String>, pcsc::Error> {
        Ok(self
            .reader_names()?
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    /// Open a channel to the card in the first reader
    ///
    /// Fails with `NoSmartcard` while the field is empty, which the poller
    /// treats as "no tag yet".
    pub fn connect_first(&self) -> Result<(PcscTransceiver, String), pcsc::Error> {
        let name = self
            .reader_names()?
            .into_iter()
            .next()
            .ok_or(pcsc::Error::NoReadersAvailable)?;
        let card = self.context.connect(&name, ShareMode::Shared, Protocols::ANY)?;
        Ok((PcscTransceiver::new(card), name.to_string_lossy().into_owned()))
    }
}
