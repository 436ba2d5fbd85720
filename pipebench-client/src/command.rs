//! Store commands and their wire encoding

use bytes::BytesMut;
use pipebench::Operation;

use crate::resp::{encode_command, write_array_header, write_bulk};

/// An owned command, for ad-hoc requests such as `PING` or `AUTH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![name.as_ref().to_vec()],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        encode_command(buf, &self.args);
    }
}

impl From<&Operation<'_>> for Command {
    fn from(op: &Operation<'_>) -> Self {
        let mut args = Vec::with_capacity(arg_count(op));
        for_each_arg(op, |arg| args.push(arg.to_vec()));
        Command { args }
    }
}

/// Append a batch operation without building an owned [`Command`]
pub fn encode_operation(buf: &mut BytesMut, op: &Operation<'_>) {
    write_array_header(buf, arg_count(op));
    for_each_arg(op, |arg| write_bulk(buf, arg));
}

fn arg_count(op: &Operation<'_>) -> usize {
    match op {
        Operation::Set { .. } => 3,
        Operation::HSet { fields, .. } => 2 + 2 * fields.len(),
        Operation::LPush { items, .. } => 2 + items.len(),
        Operation::Get { .. } => 2,
    }
}

fn for_each_arg(op: &Operation<'_>, mut f: impl FnMut(&[u8])) {
    f(op.name().as_bytes());
    f(op.key().as_bytes());
    match *op {
        Operation::Set { value, .. } => f(value.as_bytes()),
        Operation::HSet { fields, .. } => {
            for (field, value) in fields {
                f(field.as_bytes());
                f(value.as_bytes());
            }
        }
        Operation::LPush { items, .. } => {
            for item in items {
                f(item.as_bytes());
            }
        }
        Operation::Get { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipebench::BatchBuilder;

    #[test]
    fn test_encode_batch_operations() {
        let mut builder = BatchBuilder::new(1);
        let batch = builder.build_at(2);

        let mut buf = BytesMut::new();
        for op in batch.operations() {
            encode_operation(&mut buf, &op);
        }

        let expected = concat!(
            "*3\r\n$3\r\nSET\r\n$4\r\nk1-2\r\n$5\r\nvalue\r\n",
            "*6\r\n$4\r\nHSET\r\n$9\r\nk1-2:hash\r\n$6\r\nfield1\r\n$6\r\nvalue1\r\n$6\r\nfield2\r\n$6\r\nvalue2\r\n",
            "*5\r\n$5\r\nLPUSH\r\n$9\r\nk1-2:list\r\n$5\r\nitem1\r\n$5\r\nitem2\r\n$5\r\nitem3\r\n",
            "*2\r\n$3\r\nGET\r\n$4\r\nk1-2\r\n",
        );
        assert_eq!(&buf[..], expected.as_bytes());
    }

    #[test]
    fn test_command_from_operation_matches_direct_encoding() {
        let mut builder = BatchBuilder::new(8);
        let batch = builder.build_at(99);

        for op in batch.operations() {
            let mut direct = BytesMut::new();
            encode_operation(&mut direct, &op);

            let mut owned = BytesMut::new();
            Command::from(&op).encode(&mut owned);

            assert_eq!(direct, owned);
        }
    }

    #[test]
    fn test_command_builder() {
        let cmd = Command::new("AUTH").arg("secret");
        let mut buf = BytesMut::new();
        cmd.encode(&mut buf);

        assert_eq!(cmd.name(), b"AUTH");
        assert_eq!(&buf[..], b"*2\r\n$4\r\nAUTH\r\n$6\r\nsecret\r\n");
    }
}
