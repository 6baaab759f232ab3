use std::collections::HashMap;

/// Reply used by the SSH shell for any line missing from its table.
pub const COMMAND_NOT_FOUND: &str = "command not found\n";

/// Immutable mapping from a command string to its canned response.
///
/// Lookups are exact and case-sensitive. The table is never mutated after construction, so it is
/// shared across sessions behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: HashMap<String, String>,
}

impl CommandTable {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, command: &str) -> Option<&str> {
        self.entries.get(command).map(String::as_str)
    }

    pub fn contains(&self, command: &str) -> bool {
        self.entries.contains_key(command)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fake Ubuntu userland answered by the SSH shell. `extra` entries override the defaults.
    pub fn ssh_default<I, K, V>(hostname: &str, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: HashMap<String, String> = [
            ("ls", "bin  boot  dev  etc  home  lib  opt  proc  root  tmp  usr  var\n".to_string()),
            ("pwd", "/root\n".to_string()),
            ("whoami", "root\n".to_string()),
            ("id", "uid=0(root) gid=0(root) groups=0(root)\n".to_string()),
            ("uname", "Linux\n".to_string()),
            (
                "uname -a",
                format!(
                    "Linux {} 5.15.0-91-generic #101-Ubuntu SMP Tue Nov 14 13:30:08 UTC 2023 x86_64 x86_64 x86_64 GNU/Linux\n",
                    hostname
                ),
            ),
            ("hostname", format!("{}\n", hostname)),
            (
                "uptime",
                " 14:02:11 up 41 days,  3:17,  1 user,  load average: 0.08, 0.03, 0.01\n".to_string(),
            ),
            (
                "ps",
                "    PID TTY          TIME CMD\n   1187 pts/0    00:00:00 bash\n   1203 pts/0    00:00:00 ps\n"
                    .to_string(),
            ),
            (
                "cat /etc/passwd",
                "root:x:0:0:root:/root:/bin/bash\n\
                 daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n\
                 www-data:x:33:33:www-data:/var/www:/usr/sbin/nologin\n\
                 ubuntu:x:1000:1000:Ubuntu:/home/ubuntu:/bin/bash\n"
                    .to_string(),
            ),
            (
                "ifconfig",
                "eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\n        \
                 inet 10.0.2.15  netmask 255.255.255.0  broadcast 10.0.2.255\n        \
                 ether 08:00:27:4e:66:a1  txqueuelen 1000  (Ethernet)\n"
                    .to_string(),
            ),
            (
                "w",
                " 14:02:11 up 41 days,  3:17,  1 user,  load average: 0.08, 0.03, 0.01\n\
                 USER     TTY      FROM             LOGIN@   IDLE   JCPU   PCPU WHAT\n\
                 root     pts/0    10.0.2.2         14:01    0.00s  0.01s  0.00s w\n"
                    .to_string(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        for (k, v) in extra {
            entries.insert(k.into(), v.into());
        }
        Self { entries }
    }

    /// Replies of the authenticated FTP control channel, keyed by upper-cased verb. Verbs
    /// needing a data connection or a filesystem are absent and get `502`.
    pub fn ftp_default() -> Self {
        let listing = "250-Directory listing:\r\n\
             drwxr-xr-x    2 0        0            4096 Mar 02 09:14 backup\r\n\
             drwxr-xr-x    2 0        0            4096 Jan 17 22:40 pub\r\n\
             -rw-r--r--    1 0        0             220 Jan 17 22:41 README\r\n\
             -rw-------    1 0        0            1337 Feb 28 11:03 db_dump.sql\r\n\
             250 End of listing.\r\n";

        Self::new([
            ("PWD", "257 \"/\" is the current directory\r\n"),
            ("XPWD", "257 \"/\" is the current directory\r\n"),
            ("CWD", "250 Directory successfully changed.\r\n"),
            ("CDUP", "250 Directory successfully changed.\r\n"),
            ("SYST", "215 UNIX Type: L8\r\n"),
            ("TYPE", "200 Switching to Binary mode.\r\n"),
            ("NOOP", "200 NOOP ok.\r\n"),
            (
                "FEAT",
                "211-Features:\r\n EPRT\r\n EPSV\r\n MDTM\r\n PASV\r\n SIZE\r\n UTF8\r\n211 End\r\n",
            ),
            (
                "HELP",
                "214-The following commands are recognized.\r\n \
                 CDUP CWD FEAT HELP LIST NLST NOOP PWD QUIT STAT SYST TYPE\r\n\
                 214 Help OK.\r\n",
            ),
            (
                "STAT",
                "211-FTP server status:\r\n     Connected\r\n     Logged in\r\n     \
                 TYPE: BINARY\r\n211 End of status\r\n",
            ),
            ("LIST", listing),
            ("NLST", listing),
        ])
    }
}
