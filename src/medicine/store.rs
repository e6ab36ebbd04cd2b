//! JSON-file backed medicine list.
//!
//! Every mutation is written through immediately. A failed write restores the
//! in-memory list to what it was before the call, so memory and disk never
//! disagree after an error.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::MedicineError;

/// 登録された薬1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: u32,
    pub name: String,
    /// 服用時刻 "HH:MM"
    pub taken_time: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub uses: Vec<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
}

/// 追加する薬の内容（IDは自動採番）
#[derive(Debug, Clone, Default)]
pub struct NewMedicine {
    pub name: String,
    pub taken_time: String,
    pub dosage: String,
    pub uses: Vec<String>,
    pub side_effects: Vec<String>,
}

/// 部分更新。Noneの項目は変更しない
#[derive(Debug, Clone, Default)]
pub struct MedicineUpdate {
    pub name: Option<String>,
    pub taken_time: Option<String>,
    pub dosage: Option<String>,
    pub uses: Option<Vec<String>>,
    pub side_effects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    Time,
    Name,
    Id,
}

/// "HH:MM" に正規化する（"8:05" → "08:05"）
pub fn normalize_time(value: &str) -> Result<String, MedicineError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| MedicineError::InvalidTime(value.to_string()))
}

pub struct MedicineStore {
    path: PathBuf,
    medicines: Vec<Medicine>,
}

impl MedicineStore {
    /// ファイルを読み込む。存在しない・壊れている場合は空リスト
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            medicines: Vec::new(),
        };
        store.reload();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ディスクから読み直す
    pub fn reload(&mut self) {
        self.medicines = match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "invalid medicine data, starting empty");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "medicine data not found, starting empty");
                Vec::new()
            }
        };
    }

    /// 一時ファイルに書いてからrenameする
    fn save(&self) -> Result<(), MedicineError> {
        let json = serde_json::to_string_pretty(&self.medicines)?;
        let persist = |source| MedicineError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(persist)?;
        fs::rename(&tmp, &self.path).map_err(persist)?;
        Ok(())
    }

    /// 変更を保存し、失敗したら変更前に戻す
    fn commit(&mut self, before: Vec<Medicine>) -> Result<(), MedicineError> {
        if let Err(e) = self.save() {
            self.medicines = before;
            tracing::error!(error = %e, "failed to save medicine data, changes rolled back");
            return Err(e);
        }
        Ok(())
    }

    pub fn all(&self) -> &[Medicine] {
        &self.medicines
    }

    pub fn len(&self) -> usize {
        self.medicines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medicines.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Medicine> {
        self.medicines.iter().find(|m| m.id == id)
    }

    /// 大文字小文字を区別しない名前検索
    pub fn find_by_name(&self, name: &str) -> Option<&Medicine> {
        let name = name.to_lowercase();
        self.medicines.iter().find(|m| m.name.to_lowercase() == name)
    }

    /// 指定時刻 "HH:MM" に服用する薬
    pub fn due_at(&self, time: &str) -> Vec<&Medicine> {
        self.medicines.iter().filter(|m| m.taken_time == time).collect()
    }

    pub fn add(&mut self, new: NewMedicine) -> Result<Medicine, MedicineError> {
        let name = new.name.trim();
        if name.is_empty() || new.taken_time.trim().is_empty() {
            return Err(MedicineError::MissingField);
        }
        let taken_time = normalize_time(&new.taken_time)?;
        if self.find_by_name(name).is_some() {
            return Err(MedicineError::Duplicate(name.to_string()));
        }

        let max_id = self.medicines.iter().map(|m| m.id).max().unwrap_or(0);
        let id = max_id.checked_add(1).ok_or(MedicineError::IdExhausted(max_id))?;
        let medicine = Medicine {
            id,
            name: name.to_string(),
            taken_time,
            dosage: new.dosage,
            uses: new.uses,
            side_effects: new.side_effects,
        };

        let before = self.medicines.clone();
        self.medicines.push(medicine.clone());
        self.commit(before)?;
        tracing::info!(id, name = %medicine.name, time = %medicine.taken_time, "medicine added");
        Ok(medicine)
    }

    pub fn remove(&mut self, id: u32) -> Result<Medicine, MedicineError> {
        let index = self
            .medicines
            .iter()
            .position(|m| m.id == id)
            .ok_or(MedicineError::NotFound(id))?;

        let before = self.medicines.clone();
        let removed = self.medicines.remove(index);
        self.commit(before)?;
        tracing::info!(id, name = %removed.name, "medicine removed");
        Ok(removed)
    }

    pub fn update(&mut self, id: u32, update: MedicineUpdate) -> Result<Medicine, MedicineError> {
        let index = self
            .medicines
            .iter()
            .position(|m| m.id == id)
            .ok_or(MedicineError::NotFound(id))?;

        let name = match update.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(MedicineError::MissingField);
                }
                if self.find_by_name(&name).is_some_and(|m| m.id != id) {
                    return Err(MedicineError::Duplicate(name));
                }
                Some(name)
            }
            None => None,
        };
        let taken_time = update.taken_time.as_deref().map(normalize_time).transpose()?;

        let before = self.medicines.clone();
        let medicine = &mut self.medicines[index];
        if let Some(name) = name {
            medicine.name = name;
        }
        if let Some(time) = taken_time {
            medicine.taken_time = time;
        }
        if let Some(dosage) = update.dosage {
            medicine.dosage = dosage;
        }
        if let Some(uses) = update.uses {
            medicine.uses = uses;
        }
        if let Some(side_effects) = update.side_effects {
            medicine.side_effects = side_effects;
        }
        let updated = medicine.clone();

        self.commit(before)?;
        tracing::info!(id, "medicine updated");
        Ok(updated)
    }

    pub fn sorted(&self, key: SortKey) -> Vec<&Medicine> {
        let mut list: Vec<&Medicine> = self.medicines.iter().collect();
        match key {
            SortKey::Time => list.sort_by(|a, b| a.taken_time.cmp(&b.taken_time)),
            SortKey::Name => list.sort_by_key(|m| m.name.to_lowercase()),
            SortKey::Id => list.sort_by_key(|m| m.id),
        }
        list
    }

    /// 名前・用途・用量の部分一致（大文字小文字を区別しない）
    pub fn search(&self, query: &str) -> Vec<&Medicine> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.medicines.iter().collect();
        }
        self.medicines
            .iter()
            .filter(|m| {
                m.name.to_lowercase().contains(&query)
                    || m.dosage.to_lowercase().contains(&query)
                    || m.uses.iter().any(|u| u.to_lowercase().contains(&query))
            })
            .collect()
    }
}
