/// Control codes understood by the server.
///
/// The numeric values are fixed by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    CreateQuery = 0x00,
    CloseQuery = 0x02,
    Bind = 0x03,
    Iterate = 0x04,
    Execute = 0x05,
    QueryInfo = 0x06,
    QueryOptions = 0x07,
    CreateDatabase = 0x08,
    AddDocument = 0x09,
    Watch = 0x0A,
    Unwatch = 0x0B,
    ReplaceDocument = 0x0C,
    StoreBinary = 0x0D,
    Context = 0x0E,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::CreateQuery => "create-query",
            Command::CloseQuery => "close-query",
            Command::Bind => "bind",
            Command::Iterate => "iterate",
            Command::Execute => "execute",
            Command::QueryInfo => "query-info",
            Command::QueryOptions => "query-options",
            Command::CreateDatabase => "create-database",
            Command::AddDocument => "add-document",
            Command::Watch => "watch",
            Command::Unwatch => "unwatch",
            Command::ReplaceDocument => "replace-document",
            Command::StoreBinary => "store-binary",
            Command::Context => "context",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}
