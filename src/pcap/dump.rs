use crate::pcap::header::PcapFileHeader;
use log::error;
use std::fs::File;
use std::io::{self, BufWriter, Write};

// 読み取ったままのPCAPバイト列をファイルへ書き戻すシンク。
// デコードに失敗したレコードもバイト単位で忠実にダンプされる。
pub struct PcapDump {
    base_name: String,
    // 1ファイルの最大サイズ (バイト)。0なら無制限
    max_size: u64,
    // 保持するローテーションファイル数。0なら無制限
    max_files: u32,
    file_num: u32,
    current_size: u64,
    file_header: Option<[u8; 24]>,
    writer: Option<BufWriter<File>>,
}

impl PcapDump {
    pub fn new(base_name: String) -> Self {
        Self {
            base_name,
            max_size: 0,
            max_files: 0,
            file_num: 0,
            current_size: 0,
            file_header: None,
            writer: None,
        }
    }

    pub fn set_max_size(&mut self, bytes: u64) {
        self.max_size = bytes;
    }

    pub fn set_max_files(&mut self, count: u32) {
        self.max_files = count;
    }

    pub fn set_file_header(&mut self, header: &PcapFileHeader) {
        self.file_header = Some(header.raw);
    }

    fn rotating(&self) -> bool {
        self.max_size > 0 || self.max_files > 0
    }

    fn current_name(&self) -> String {
        if self.rotating() {
            format!("{}.{:03}.pcap", self.base_name, self.file_num)
        } else {
            format!("{}.pcap", self.base_name)
        }
    }

    // 新しいダンプファイルを開き、グローバルヘッダーを書き込む
    fn start_new_file(&mut self) -> io::Result<()> {
        let header = self.file_header.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "PCAPファイルヘッダーが未設定です",
            )
        })?;

        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        // 古いローテーションファイルを削除する
        if self.max_files > 0 && self.file_num >= self.max_files {
            let old = format!(
                "{}.{:03}.pcap",
                self.base_name,
                self.file_num - self.max_files
            );
            if let Err(e) = std::fs::remove_file(&old) {
                if e.kind() != io::ErrorKind::NotFound {
                    error!("古いダンプファイル {} を削除できません: {}", old, e);
                }
            }
        }

        let name = self.current_name();
        self.file_num += 1;
        let mut writer = BufWriter::new(File::create(name)?);
        writer.write_all(&header)?;
        self.current_size = header.len() as u64;
        self.writer = Some(writer);

        Ok(())
    }

    // 読み取ったままのレコードヘッダーとペイロードを書き込む
    pub fn write_record(&mut self, header: &[u8; 16], data: &[u8]) -> io::Result<()> {
        if self.writer.is_none() {
            self.start_new_file()?;
        }

        let record_size = header.len() as u64 + data.len() as u64;
        if self.max_size > 0 && self.current_size + record_size > self.max_size {
            self.start_new_file()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(header)?;
            writer.write_all(data)?;
            self.current_size += record_size;
        }

        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                error!("ダンプファイルのフラッシュに失敗しました: {}", e);
            }
        }
    }
}

impl Drop for PcapDump {
    fn drop(&mut self) {
        self.close();
    }
}
