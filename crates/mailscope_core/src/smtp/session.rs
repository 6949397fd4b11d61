//! Probe dialogue against one SMTP endpoint
//!
//! The dialogue stops after `RCPT TO`; no message data is ever sent.

use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::trace;

/// Longest reply line accepted from a server
const MAX_LINE_LEN: usize = 4096;
/// Upper bound on continuation lines in one reply
const MAX_REPLY_LINES: usize = 64;

/// Parsed SMTP reply, possibly spanning several `NNN-` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// True when the server may accept mail for the recipient
    pub fn accepts_recipient(&self) -> bool {
        self.code == 250 || self.code == 251
    }

    /// Look up an EHLO keyword such as `STARTTLS` or `PIPELINING`
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }

    /// First line with its code, the way servers print it
    pub fn summary(&self) -> String {
        match self.lines.first() {
            Some(text) if !text.is_empty() => format!("{} {}", self.code, text),
            _ => self.code.to_string(),
        }
    }
}

/// Names used in the probe dialogue
#[derive(Debug, Clone)]
pub struct Dialogue<'x> {
    pub helo_domain: &'x str,
    pub mail_from: &'x str,
    pub recipient: &'x str,
}

/// How far a dialogue got before it ended, failed, or ran out of time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub banner: Option<SmtpReply>,
    pub greeted: bool,
    pub starttls: bool,
    pub sender_accepted: bool,
    pub rcpt: Option<SmtpReply>,
}

impl Progress {
    /// Most recent reply worth reporting
    pub fn last_reply(&self) -> Option<&SmtpReply> {
        self.rcpt.as_ref().or(self.banner.as_ref())
    }
}

/// Read one complete reply
pub async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<SmtpReply> {
    let mut lines = Vec::new();
    let mut code = None;

    loop {
        let line = read_line_bounded(reader).await?;
        if lines.len() >= MAX_REPLY_LINES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "reply too long"));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        let (line_code, last, text) = parse_line(line)?;
        match code {
            None => code = Some(line_code),
            Some(expected) if expected != line_code => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("reply code changed from {} to {}", expected, line_code),
                ));
            }
            Some(_) => {}
        }
        lines.push(text.to_string());

        if last {
            return Ok(SmtpReply {
                code: line_code,
                lines,
            });
        }
    }
}

/// Read up to one newline, never buffering more than `MAX_LINE_LEN` bytes
///
/// Servers are not obliged to send UTF-8, so invalid bytes are replaced
/// rather than failing the reply.
async fn read_line_bounded<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if buf.len() > MAX_LINE_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "reply line too long"));
    }
    if read == 0 || buf.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-reply",
        ));
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Split `250-text` / `250 text` / `250` into code, final flag and text
fn parse_line(line: &str) -> io::Result<(u16, bool, &str)> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidData, format!("malformed reply line: {:?}", line));

    let digits = line.get(..3).ok_or_else(invalid)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let code = digits.parse::<u16>().map_err(|_| invalid())?;

    match line.as_bytes().get(3) {
        None => Ok((code, true, "")),
        Some(b' ') => Ok((code, true, &line[4..])),
        Some(b'-') => Ok((code, false, &line[4..])),
        Some(_) => Err(invalid()),
    }
}

/// Run banner, EHLO, MAIL FROM, RCPT TO and QUIT over `stream`
///
/// `progress` is updated as each step completes so a caller that abandons
/// the future on a deadline still knows how far the server went.
pub async fn converse<S>(stream: S, dialogue: &Dialogue<'_>, progress: &mut Progress) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    let banner = read_reply(&mut stream).await?;
    trace!("SMTP banner: {}", banner.summary());
    let ready = banner.code == 220;
    progress.banner = Some(banner);
    if !ready {
        return quit(&mut stream).await;
    }

    let ehlo = command(&mut stream, &format!("EHLO {}", dialogue.helo_domain)).await?;
    if ehlo.is_positive_completion() {
        progress.starttls = ehlo.has_extension("STARTTLS");
        progress.greeted = true;
    } else {
        let helo = command(&mut stream, &format!("HELO {}", dialogue.helo_domain)).await?;
        if !helo.is_positive_completion() {
            return quit(&mut stream).await;
        }
        progress.greeted = true;
    }

    let mail = command(&mut stream, &format!("MAIL FROM:<{}>", dialogue.mail_from)).await?;
    if !mail.is_positive_completion() {
        return quit(&mut stream).await;
    }
    progress.sender_accepted = true;

    let rcpt = command(&mut stream, &format!("RCPT TO:<{}>", dialogue.recipient)).await?;
    progress.rcpt = Some(rcpt);

    quit(&mut stream).await
}

async fn command<S>(stream: &mut BufReader<S>, line: &str) -> io::Result<SmtpReply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    trace!("SMTP >> {}", line);
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    let reply = read_reply(stream).await?;
    trace!("SMTP << {}", reply.summary());
    Ok(reply)
}

/// Best effort; the server may already have hung up
async fn quit<S>(stream: &mut BufReader<S>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if command(stream, "QUIT").await.is_err() {
        trace!("QUIT not acknowledged");
    }
    Ok(())
}
